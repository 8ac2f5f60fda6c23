//! Host-side run state. A debugger or a runner owns a `Session` and drives a `Cpu` through it.

use log::debug;

use super::{Cpu, Step};
use crate::error::CpuError;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct Session {
  /// Instructions executed so far.
  pub cycles : u64,
  pub halted : bool,
}

impl Session {

  pub fn new() -> Session {
    Session::default()
  }

  /// Executes one instruction unless the machine has already halted.
  pub fn step(&mut self, cpu: &mut Cpu) -> Result<Step, CpuError> {
    if self.halted || cpu.is_halted() {
      self.halted = true;
      return Ok(Step::Halted);
    }

    let step = cpu.step()?;
    self.cycles += 1;
    if step == Step::Halted {
      self.halted = true;
      debug!("halted after {} cycles", self.cycles);
    }
    Ok(step)
  }

  /// Steps until the machine halts or `limit` more instructions have run.
  pub fn run(&mut self, cpu: &mut Cpu, limit: Option<u64>) -> Result<Step, CpuError> {
    let mut executed = 0u64;
    loop {
      if let Some(limit) = limit {
        if executed >= limit {
          return Ok(match self.halted { true => Step::Halted, false => Step::Continue });
        }
      }
      if self.step(cpu)? == Step::Halted {
        return Ok(Step::Halted);
      }
      executed += 1;
    }
  }

}
