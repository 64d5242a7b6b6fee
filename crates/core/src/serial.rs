// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Serial console plumbing between the emulated UART and host terminals.
//!
//! [`SerialLink`] keeps a bounded window of everything the firmware printed and
//! fans new output out to subscribed terminals. Input flows the other way one
//! byte at a time into whichever session the link is connected to.
//!
//! Lock order is session first, link second: the UART transmit hook runs with
//! the session locked and then takes the link lock. The link therefore never
//! holds its own lock while locking a session.

use crate::session::{EmulationSession, SharedSession};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

/// Output side of a terminal widget.
///
/// `write` is called with the session locked, so implementations must not
/// feed input back into the link from inside it.
pub trait Terminal: Send {
    fn write(&mut self, text: &str);
}

struct Subscriber {
    id: u64,
    terminal: Box<dyn Terminal>,
}

#[derive(Default)]
struct LinkInner {
    output: VecDeque<char>,
    window: usize,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    session: Option<Weak<Mutex<EmulationSession>>>,
}

pub struct SerialLink {
    inner: Mutex<LinkInner>,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("SerialLink");
        if let Ok(inner) = self.inner.lock() {
            s.field("retained", &inner.output.len())
                .field("window", &inner.window)
                .field("subscribers", &inner.subscribers.len())
                .field("connected", &inner.session.is_some());
        }
        s.finish()
    }
}

impl SerialLink {
    /// `window` is the number of output characters retained for late subscribers.
    pub fn new(window: usize) -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                window: window.max(1),
                ..Default::default()
            }),
        }
    }

    /// Appends one transmitted byte and forwards it to every subscriber.
    pub fn push_byte(&self, byte: u8) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let ch = byte as char;
        inner.output.push_back(ch);
        while inner.output.len() > inner.window {
            inner.output.pop_front();
        }
        let mut buf = [0u8; 4];
        let text: &str = ch.encode_utf8(&mut buf);
        for sub in inner.subscribers.iter_mut() {
            sub.terminal.write(text);
        }
    }

    /// Retained output, oldest first.
    pub fn output(&self) -> String {
        self.inner
            .lock()
            .map(|inner| inner.output.iter().collect())
            .unwrap_or_default()
    }

    /// Routes host input to `session` until [`SerialLink::disconnect`].
    pub fn connect(&self, session: &SharedSession) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.session = Some(Arc::downgrade(session));
        }
    }

    pub fn disconnect(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.session = None;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .session
                    .as_ref()
                    .is_some_and(|weak| weak.strong_count() > 0)
            })
            .unwrap_or(false)
    }

    /// Delivers one byte to the connected session's UART.
    ///
    /// Returns `false` when no live session is connected; the byte is dropped.
    pub fn receive_byte(&self, byte: u8) -> bool {
        let target = match self.inner.lock() {
            Ok(inner) => inner.session.clone(),
            Err(_) => None,
        };
        let Some(session) = target.and_then(|weak| weak.upgrade()) else {
            tracing::debug!("Serial input {:#04x} dropped: no running session", byte);
            return false;
        };
        let delivered = match session.lock() {
            Ok(mut session) => {
                session.receive_byte(byte);
                true
            }
            Err(_) => false,
        };
        delivered
    }

    /// Replays retained output into `terminal`, then subscribes it to new output.
    pub fn subscribe(&self, mut terminal: Box<dyn Terminal>) -> u64 {
        let Ok(mut inner) = self.inner.lock() else {
            return u64::MAX;
        };
        if !inner.output.is_empty() {
            let backlog: String = inner.output.iter().collect();
            terminal.write(&backlog);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, terminal });
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.retain(|sub| sub.id != id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.subscribers.len())
            .unwrap_or(0)
    }
}

/// A terminal attached to a [`SerialLink`].
///
/// Detaching (explicitly or by dropping the bridge) only removes the terminal;
/// the session behind the link keeps running.
#[derive(Debug)]
pub struct SerialBridge {
    link: Arc<SerialLink>,
    id: Option<u64>,
}

impl SerialBridge {
    pub fn attach(link: Arc<SerialLink>, terminal: Box<dyn Terminal>) -> Self {
        let id = link.subscribe(terminal);
        tracing::debug!("Terminal {} attached to serial link", id);
        Self { link, id: Some(id) }
    }

    /// Forwards terminal input byte by byte. Returns how many bytes reached a session.
    pub fn on_data(&self, text: &str) -> usize {
        text.bytes()
            .filter(|b| self.link.receive_byte(*b))
            .count()
    }

    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.link.unsubscribe(id);
            tracing::debug!("Terminal {} detached from serial link", id);
        }
    }
}

impl Drop for SerialBridge {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<String>>);

    impl Terminal for Capture {
        fn write(&mut self, text: &str) {
            self.0.lock().unwrap().push_str(text);
        }
    }

    impl Capture {
        fn text(&self) -> String {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_window_drops_oldest() {
        let link = SerialLink::new(4);
        for b in b"abcdef" {
            link.push_byte(*b);
        }
        assert_eq!(link.output(), "cdef");
    }

    #[test]
    fn test_subscribe_replays_backlog_then_streams() {
        let link = Arc::new(SerialLink::new(64));
        link.push_byte(b'o');
        link.push_byte(b'k');

        let capture = Capture::default();
        let bridge = SerialBridge::attach(link.clone(), Box::new(capture.clone()));
        assert_eq!(capture.text(), "ok");

        link.push_byte(b'!');
        assert_eq!(capture.text(), "ok!");

        bridge.detach();
        assert_eq!(link.subscriber_count(), 0);
        link.push_byte(b'?');
        assert_eq!(capture.text(), "ok!");
        assert_eq!(link.output(), "ok!?");
    }

    #[test]
    fn test_drop_unsubscribes() {
        let link = Arc::new(SerialLink::new(8));
        {
            let _bridge = SerialBridge::attach(link.clone(), Box::new(Capture::default()));
            assert_eq!(link.subscriber_count(), 1);
        }
        assert_eq!(link.subscriber_count(), 0);
    }

    #[test]
    fn test_input_without_session_is_dropped() {
        let link = Arc::new(SerialLink::new(8));
        let bridge = SerialBridge::attach(link.clone(), Box::new(Capture::default()));
        assert!(!link.is_connected());
        assert_eq!(bridge.on_data("abc"), 0);
    }
}
