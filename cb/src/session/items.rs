//! Item-level operations built on top of `send`

use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{CallKind, ComponentSession, ReplyCallback, reply_once};
use crate::coalescer::PresaveHook;
use crate::error::BridgeError;
use crate::protocol::{Item, MessageId, Permission};

/// Callback fed every item pushed on a stream
pub type ItemCallback = Box<dyn FnMut(&mut ComponentSession, Item)>;

/// Callback fed every batch of items pushed on a stream
pub type ItemsCallback = Box<dyn FnMut(&mut ComponentSession, Vec<Item>)>;

type SendResult = Result<Option<MessageId>, BridgeError>;

fn decode_item(value: &Value) -> Option<Item> {
    serde_json::from_value(value.clone())
        .inspect_err(|e| warn!(error = %e, "Skipping malformed item"))
        .ok()
}

fn decode_items(data: &Value) -> Vec<Item> {
    data.get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(decode_item).collect())
        .unwrap_or_default()
}

/// The created item in a `create-item` reply; older hosts answer with `items`
fn created_item(data: &Value) -> Option<Item> {
    match data.get("item") {
        Some(item) if !item.is_null() => decode_item(item),
        _ => decode_items(data).into_iter().next(),
    }
}

fn item_payload(item: &Item) -> Value {
    json!({ "item": item.to_wire() })
}

fn items_payload(items: &[Item]) -> Value {
    json!({ "items": items.iter().map(Item::to_wire).collect::<Vec<_>>() })
}

impl ComponentSession {
    /// Subscribe to every item of the given content types
    pub fn stream_items(
        &mut self,
        content_types: &[&str],
        on_items: impl FnMut(&mut ComponentSession, Vec<Item>) + 'static,
    ) -> SendResult {
        debug!(?content_types, "ComponentSession::stream_items: called");
        let mut on_items: ItemsCallback = Box::new(on_items);
        self.send_call(
            "stream-items".to_string(),
            Some(json!({ "content_types": content_types })),
            Some(Box::new(move |session: &mut ComponentSession, data: Value| {
                on_items(session, decode_items(&data))
            })),
            CallKind::Stream,
        )
    }

    /// Subscribe to the item currently being edited
    ///
    /// Switching to a different item flushes a pending save first. A push for
    /// the same item that is older than our own latest save is dropped.
    pub fn stream_context_item(&mut self, on_update: impl FnMut(&mut ComponentSession, Item) + 'static) -> SendResult {
        debug!("ComponentSession::stream_context_item: called");
        let mut on_update: ItemCallback = Box::new(on_update);
        self.send_call(
            "stream-context-item".to_string(),
            None,
            Some(Box::new(move |session: &mut ComponentSession, data: Value| {
                let Some(item) = data.get("item").and_then(decode_item) else {
                    debug!("Context item push without an item");
                    return;
                };
                if session.accept_context_item(&item) {
                    on_update(session, item);
                }
            })),
            CallKind::Stream,
        )
    }

    fn accept_context_item(&mut self, item: &Item) -> bool {
        let (switched, local_stamp) = match &self.last_streamed {
            Some(last) => (last.uuid != item.uuid, last.updated_at),
            None => (false, None),
        };

        if switched {
            if self.coalescer.is_pending() {
                debug!(to = %item.uuid, "Subject switch, flushing pending save");
                if let Err(e) = self.flush_pending_save() {
                    warn!(error = %e, "Failed to flush pending save on subject switch");
                }
            }
        } else if let (Some(local), Some(incoming)) = (local_stamp, item.updated_at)
            && local > incoming
        {
            debug!(uuid = %item.uuid, %local, %incoming, "Dropping stale context item");
            return false;
        }

        self.last_streamed = Some(item.clone());
        true
    }

    /// Item last delivered on the context stream
    pub fn streamed_context_item(&self) -> Option<&Item> {
        self.last_streamed.as_ref()
    }

    pub fn save_item(&mut self, item: Item) -> Result<(), BridgeError> {
        self.save_items(vec![item])
    }

    pub fn save_items(&mut self, items: Vec<Item>) -> Result<(), BridgeError> {
        self.request_save(items, None, None, false)
    }

    /// Save with a hook that runs against the batch right before it is written
    pub fn save_items_with_presave(
        &mut self,
        items: Vec<Item>,
        on_presave: impl FnOnce(&mut [Item]) + 'static,
    ) -> Result<(), BridgeError> {
        self.request_save(items, None, Some(Box::new(on_presave)), false)
    }

    /// Hand items to the save coalescer
    ///
    /// Items are stamped with the current wall time here. `on_flush` runs when
    /// the host acknowledges the write.
    pub fn request_save(
        &mut self,
        items: Vec<Item>,
        on_flush: Option<ReplyCallback>,
        on_presave: Option<PresaveHook>,
        skip_debounce: bool,
    ) -> Result<(), BridgeError> {
        debug!(items = items.len(), skip_debounce, "ComponentSession::request_save: called");
        let stamp = self.clock.wall();

        // Our own edit supersedes whatever the host last pushed for this item
        if let Some(last) = self.last_streamed.as_mut()
            && items.iter().any(|item| item.uuid == last.uuid)
        {
            last.updated_at = Some(stamp);
        }

        let now = self.clock.now();
        match self.coalescer.request(items, on_flush, on_presave, skip_debounce, now, stamp) {
            Some(batch) => self.write_batch(batch),
            None => Ok(()),
        }
    }

    /// Write the pending save now, if there is one
    pub fn flush_pending_save(&mut self) -> Result<bool, BridgeError> {
        match self.coalescer.flush() {
            Some(batch) => self.write_batch(batch).map(|_| true),
            None => Ok(false),
        }
    }

    /// Whether a save is waiting out its debounce window
    pub fn has_pending_save(&self) -> bool {
        self.coalescer.is_pending()
    }

    /// Ask the host to create `item`, then associate it with this component
    pub fn create_item(
        &mut self,
        item: &Item,
        on_created: impl FnOnce(&mut ComponentSession, Item) + 'static,
    ) -> SendResult {
        debug!(uuid = %item.uuid, "ComponentSession::create_item: called");
        self.send_call(
            "create-item".to_string(),
            Some(item_payload(item)),
            Some(reply_once(move |session, data| {
                let Some(created) = created_item(&data) else {
                    warn!("create-item reply carried no item");
                    return;
                };
                if let Err(e) = session.associate_item(&created) {
                    warn!(error = %e, uuid = %created.uuid, "Failed to associate created item");
                }
                on_created(session, created);
            })),
            CallKind::OneShot,
        )
    }

    pub fn create_items(
        &mut self,
        items: &[Item],
        on_created: impl FnOnce(&mut ComponentSession, Vec<Item>) + 'static,
    ) -> SendResult {
        debug!(items = items.len(), "ComponentSession::create_items: called");
        self.send_call(
            "create-items".to_string(),
            Some(items_payload(items)),
            Some(reply_once(move |session, data| on_created(session, decode_items(&data)))),
            CallKind::OneShot,
        )
    }

    pub fn associate_item(&mut self, item: &Item) -> SendResult {
        self.send("associate-item", Some(item_payload(item)), None)
    }

    pub fn deassociate_item(&mut self, item: &Item) -> SendResult {
        self.send("deassociate-item", Some(item_payload(item)), None)
    }

    pub fn select_item(&mut self, item: &Item) -> SendResult {
        self.send("select-item", Some(item_payload(item)), None)
    }

    pub fn clear_selection(&mut self) -> SendResult {
        self.send("clear-selection", Some(json!({ "content_type": "Tag" })), None)
    }

    pub fn delete_item(&mut self, item: &Item) -> SendResult {
        self.delete_items(std::slice::from_ref(item))
    }

    pub fn delete_items(&mut self, items: &[Item]) -> SendResult {
        debug!(items = items.len(), "ComponentSession::delete_items: called");
        self.send("delete-items", Some(items_payload(items)), None)
    }

    /// Send an arbitrary action and receive its single reply
    pub fn send_custom_event(
        &mut self,
        action: &str,
        data: Value,
        on_reply: impl FnOnce(&mut ComponentSession, Value) + 'static,
    ) -> SendResult {
        self.send(action, Some(data), Some(reply_once(on_reply)))
    }

    /// Ask the host to resize this component's surface
    pub fn set_size(&mut self, kind: &str, width: impl Into<Value>, height: impl Into<Value>) -> SendResult {
        let data = json!({ "type": kind, "width": width.into(), "height": height.into() });
        self.send("set-size", Some(data), None)
    }

    pub fn request_permissions(
        &mut self,
        permissions: &[Permission],
        on_reply: Option<ReplyCallback>,
    ) -> SendResult {
        debug!(count = permissions.len(), "ComponentSession::request_permissions: called");
        let permissions = serde_json::to_value(permissions).map_err(BridgeError::Encode)?;
        self.send("request-permissions", Some(json!({ "permissions": permissions })), on_reply)
    }

    /// Component-scoped data delivered with the handshake
    pub fn component_data(&self) -> &serde_json::Map<String, Value> {
        &self.component_data
    }

    pub fn component_data_value(&self, key: &str) -> Option<&Value> {
        self.component_data.get(key)
    }

    pub fn set_component_data_value(&mut self, key: &str, value: Value) -> SendResult {
        debug!(%key, "ComponentSession::set_component_data_value: called");
        self.component_data.insert(key.to_string(), value);
        self.push_component_data()
    }

    pub fn clear_component_data(&mut self) -> SendResult {
        debug!("ComponentSession::clear_component_data: called");
        self.component_data.clear();
        self.push_component_data()
    }

    fn push_component_data(&mut self) -> SendResult {
        let data = json!({ "componentData": self.component_data });
        self.send("set-component-data", Some(data), None)
    }
}
