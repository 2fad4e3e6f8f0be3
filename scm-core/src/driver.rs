//! Scheduler for a set of machines.
//!
//! The embedding owns a [`Scheduler`], inserts machines into it and calls
//! [`Scheduler::advance`] once per frame. Machines with queued events are
//! drained by [`Scheduler::pump_events`].

use crate::error::ScmError;
use crate::machine::Machine;
use std::collections::BTreeMap;

/// Key of a machine inside a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MachineKey(pub u64);

impl std::fmt::Display for MachineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owns machines and drives them together.
#[derive(Debug, Default)]
pub struct Scheduler {
    machines: BTreeMap<MachineKey, Machine>,
    next_key: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, machine: Machine) -> MachineKey {
        let key = MachineKey(self.next_key);
        self.next_key += 1;
        tracing::debug!("scheduler: added {} ({})", key, machine.id());
        self.machines.insert(key, machine);
        key
    }

    pub fn remove(&mut self, key: MachineKey) -> Result<Machine, ScmError> {
        self.machines
            .remove(&key)
            .ok_or(ScmError::MachineNotFound { key: key.0 })
    }

    pub fn get(&self, key: MachineKey) -> Result<&Machine, ScmError> {
        self.machines
            .get(&key)
            .ok_or(ScmError::MachineNotFound { key: key.0 })
    }

    pub fn get_mut(&mut self, key: MachineKey) -> Result<&mut Machine, ScmError> {
        self.machines
            .get_mut(&key)
            .ok_or(ScmError::MachineNotFound { key: key.0 })
    }

    /// Queues `event` on one machine.
    pub fn post_event(&mut self, key: MachineKey, event: impl Into<String>) -> Result<(), ScmError> {
        self.get_mut(key)?.post_event(event);
        Ok(())
    }

    /// Advances every started machine by `dt`. Stops at the first error.
    pub fn advance(&mut self, dt: f64) -> Result<(), ScmError> {
        for machine in self.machines.values_mut().filter(|m| m.is_started()) {
            machine.advance(dt)?;
        }
        Ok(())
    }

    /// Drains the queues of started machines that have pending events.
    /// Returns how many machines were pumped.
    pub fn pump_events(&mut self) -> Result<usize, ScmError> {
        let mut pumped = 0;
        for machine in self
            .machines
            .values_mut()
            .filter(|m| m.is_started() && m.has_pending_events())
        {
            machine.pump_events()?;
            pumped += 1;
        }
        Ok(pumped)
    }

    pub fn keys(&self) -> impl Iterator<Item = MachineKey> + '_ {
        self.machines.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}
