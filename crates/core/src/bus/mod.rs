// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Data space with per-address read and write hooks.
//!
//! Registers, I/O and SRAM share one flat byte array, as on the AVR. Any
//! address can carry a hook; hooked I/O addresses model peripheral behaviour
//! instead of passive storage. Hooks fire synchronously inside the access
//! that triggers them.

/// Called before a byte is stored.
///
/// `old` is the value currently held at the address. Returning `true` means
/// the hook handled the write itself and the bus must not store `value`.
pub trait WriteHook: Send {
    fn on_write(&mut self, data: &mut [u8], value: u8, old: u8) -> bool;
}

impl<F> WriteHook for F
where
    F: FnMut(&mut [u8], u8, u8) -> bool + Send,
{
    fn on_write(&mut self, data: &mut [u8], value: u8, old: u8) -> bool {
        self(data, value, old)
    }
}

/// Called instead of a plain load; returns the value the CPU observes.
pub trait ReadHook: Send {
    fn on_read(&mut self, data: &mut [u8], addr: u16) -> u8;
}

impl<F> ReadHook for F
where
    F: FnMut(&mut [u8], u16) -> u8 + Send,
{
    fn on_read(&mut self, data: &mut [u8], addr: u16) -> u8 {
        self(data, addr)
    }
}

pub struct DataBus {
    data: Vec<u8>,
    read_hooks: Vec<Option<Box<dyn ReadHook>>>,
    write_hooks: Vec<Option<Box<dyn WriteHook>>>,
}

impl std::fmt::Debug for DataBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataBus")
            .field("size", &self.data.len())
            .field(
                "read_hooks",
                &self.read_hooks.iter().filter(|h| h.is_some()).count(),
            )
            .field(
                "write_hooks",
                &self.write_hooks.iter().filter(|h| h.is_some()).count(),
            )
            .finish()
    }
}

impl DataBus {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            read_hooks: (0..size).map(|_| None).collect(),
            write_hooks: (0..size).map(|_| None).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Binds a read hook, replacing any previous one. Out-of-range addresses are ignored.
    pub fn on_read(&mut self, addr: u16, hook: impl ReadHook + 'static) {
        match self.read_hooks.get_mut(addr as usize) {
            Some(slot) => *slot = Some(Box::new(hook)),
            None => tracing::warn!("Read hook at {:#06x} is outside data space", addr),
        }
    }

    /// Binds a write hook, replacing any previous one. Out-of-range addresses are ignored.
    pub fn on_write(&mut self, addr: u16, hook: impl WriteHook + 'static) {
        match self.write_hooks.get_mut(addr as usize) {
            Some(slot) => *slot = Some(Box::new(hook)),
            None => tracing::warn!("Write hook at {:#06x} is outside data space", addr),
        }
    }

    /// Load through the read hook, if any. Unmapped addresses read as 0.
    pub fn read(&mut self, addr: u16) -> u8 {
        let a = addr as usize;
        if a >= self.data.len() {
            return 0;
        }
        if let Some(hook) = self.read_hooks[a].as_mut() {
            return hook.on_read(&mut self.data, addr);
        }
        self.data[a]
    }

    /// Store through the write hook, if any. Unmapped addresses are ignored.
    pub fn write(&mut self, addr: u16, value: u8) {
        let a = addr as usize;
        if a >= self.data.len() {
            return;
        }
        let old = self.data[a];
        if let Some(hook) = self.write_hooks[a].as_mut() {
            if hook.on_write(&mut self.data, value, old) {
                return;
            }
        }
        self.data[a] = value;
    }

    /// Raw load, bypassing hooks.
    pub fn peek(&self, addr: u16) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or(0)
    }

    /// Raw store, bypassing hooks.
    pub fn poke(&mut self, addr: u16, value: u8) {
        if let Some(slot) = self.data.get_mut(addr as usize) {
            *slot = value;
        }
    }
}
