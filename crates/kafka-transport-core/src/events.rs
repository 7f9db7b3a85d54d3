//! Observability event hooks.
//!
//! Each event keeps a small subscriber list invoked synchronously from the
//! transport loop. Subscribers must not block; anything expensive belongs on
//! a channel of the subscriber's own.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::transport::WritePayload;

fn read_list<T>(lock: &RwLock<Vec<T>>) -> RwLockReadGuard<'_, Vec<T>> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_list<T>(lock: &RwLock<Vec<T>>) -> RwLockWriteGuard<'_, Vec<T>> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Subscriber lists for the five transport events.
#[derive(Default)]
pub struct EventListeners {
    server_disconnected: RwLock<Vec<Box<dyn Fn() + Send + Sync>>>,
    reconnection_attempt: RwLock<Vec<Box<dyn Fn(u32) + Send + Sync>>>,
    read_attempt: RwLock<Vec<Box<dyn Fn(usize) + Send + Sync>>>,
    bytes_received: RwLock<Vec<Box<dyn Fn(usize) + Send + Sync>>>,
    write_attempt: RwLock<Vec<Box<dyn Fn(&WritePayload) + Send + Sync>>>,
}

impl EventListeners {
    pub(crate) fn add_server_disconnected(&self, listener: Box<dyn Fn() + Send + Sync>) {
        write_list(&self.server_disconnected).push(listener);
    }

    pub(crate) fn add_reconnection_attempt(&self, listener: Box<dyn Fn(u32) + Send + Sync>) {
        write_list(&self.reconnection_attempt).push(listener);
    }

    pub(crate) fn add_read_attempt(&self, listener: Box<dyn Fn(usize) + Send + Sync>) {
        write_list(&self.read_attempt).push(listener);
    }

    pub(crate) fn add_bytes_received(&self, listener: Box<dyn Fn(usize) + Send + Sync>) {
        write_list(&self.bytes_received).push(listener);
    }

    pub(crate) fn add_write_attempt(&self, listener: Box<dyn Fn(&WritePayload) + Send + Sync>) {
        write_list(&self.write_attempt).push(listener);
    }

    /// The server closed the connection or the stream died mid-session.
    pub(crate) fn emit_server_disconnected(&self) {
        for listener in read_list(&self.server_disconnected).iter() {
            listener();
        }
    }

    /// A connection attempt (the `n`th of the current sequence) is starting.
    pub(crate) fn emit_reconnection_attempt(&self, attempt: u32) {
        for listener in read_list(&self.reconnection_attempt).iter() {
            listener(attempt);
        }
    }

    /// A socket read for up to `remaining` bytes is starting.
    pub(crate) fn emit_read_attempt(&self, remaining: usize) {
        for listener in read_list(&self.read_attempt).iter() {
            listener(remaining);
        }
    }

    /// A socket read returned `count` bytes.
    pub(crate) fn emit_bytes_received(&self, count: usize) {
        for listener in read_list(&self.bytes_received).iter() {
            listener(count);
        }
    }

    /// A payload is about to be written to the socket.
    pub(crate) fn emit_write_attempt(&self, payload: &WritePayload) {
        for listener in read_list(&self.write_attempt).iter() {
            listener(payload);
        }
    }
}
