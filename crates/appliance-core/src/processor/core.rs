//! Processor-core execution state machine and instruction step loop.

use crate::io::IoInterrupt;
use crate::memory::{ByteOrder, MemoryAccessError, MemoryBus};

use super::features::CoreFeatures;
use super::mmu::Mmu;

/// Instruction word width fetched per step, in bytes.
pub const INSTRUCTION_BYTES: u64 = 4;

/// Per-core execution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CoreRunState {
    /// Freshly reset; the next step begins execution at the restart address.
    #[default]
    Reset,
    /// Executing one instruction per eligible tick.
    Running,
    /// Halted by the guest; only a reset resumes execution.
    Halted,
    /// An unrecovered architectural fault is latched.
    Faulted,
}

/// Immutable per-core configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    /// Byte order applied to every instruction fetch and guest access.
    pub byte_order: ByteOrder,
    /// Reset vector loaded into the program counter on reset.
    pub restart_address: u64,
    /// Initial feature mask; normalized before use.
    pub features: CoreFeatures,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::BigEndian,
            restart_address: 0,
            features: CoreFeatures::DEFAULT,
        }
    }
}

/// Outcome of one core step, reported to the driving processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreStepOutcome {
    /// One instruction retired.
    Retired,
    /// A ready interrupt was accepted and vectored.
    Interrupted(IoInterrupt),
    /// The core is halted (or was already halted) this tick.
    Halted,
    /// An architectural fault latched this step (or previously).
    Faulted(MemoryAccessError),
}

/// What the architecture glue asks the core to do after one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Continue at `next_pc`.
    Retired {
        /// Next program-counter value.
        next_pc: u64,
    },
    /// Halt the core.
    Halt,
}

/// Guest memory access surface handed to the architecture glue.
///
/// Every access goes through the MMU → bus path, so any
/// [`MemoryAccessError`] the glue propagates is converted by the core into
/// an architectural fault rather than an emulator failure.
pub struct ExecutionContext<'a> {
    memory: &'a mut MemoryBus,
    mmu: &'a Mmu,
    byte_order: ByteOrder,
    pc: u64,
}

impl ExecutionContext<'_> {
    /// Program counter of the instruction being executed.
    #[must_use]
    pub const fn pc(&self) -> u64 {
        self.pc
    }

    /// Core byte order.
    #[must_use]
    pub const fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Loads a byte at a logical address.
    ///
    /// # Errors
    ///
    /// Translation or bus faults as [`MemoryAccessError`].
    pub fn load_byte(&self, logical: u64) -> Result<u8, MemoryAccessError> {
        self.memory.load_byte(self.mmu.translate(logical)?)
    }

    /// Loads a 32-bit word at a logical address.
    ///
    /// # Errors
    ///
    /// Translation or bus faults as [`MemoryAccessError`].
    pub fn load_word(&self, logical: u64) -> Result<u32, MemoryAccessError> {
        self.memory
            .load_word(self.mmu.translate(logical)?, self.byte_order)
    }

    /// Stores a byte at a logical address.
    ///
    /// # Errors
    ///
    /// Translation or bus faults as [`MemoryAccessError`].
    pub fn store_byte(&mut self, logical: u64, value: u8) -> Result<(), MemoryAccessError> {
        self.memory.store_byte(self.mmu.translate(logical)?, value)
    }

    /// Stores a 32-bit word at a logical address.
    ///
    /// # Errors
    ///
    /// Translation or bus faults as [`MemoryAccessError`].
    pub fn store_word(&mut self, logical: u64, value: u32) -> Result<(), MemoryAccessError> {
        self.memory
            .store_word(self.mmu.translate(logical)?, value, self.byte_order)
    }
}

/// Architecture-specific decode/execute glue driven by the core step loop.
///
/// Decode tables and opcode semantics live behind this trait and are out of
/// core scope; the core only guarantees the fetch → execute → fault-convert
/// contract around it.
pub trait InstructionSet: Send {
    /// Executes one fetched instruction word.
    ///
    /// # Errors
    ///
    /// A [`MemoryAccessError`] propagated from [`ExecutionContext`] accesses;
    /// the core latches it as an architectural fault.
    fn execute(
        &mut self,
        word: u32,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ExecuteOutcome, MemoryAccessError>;

    /// Runs the architecture's interrupt entry sequence and returns the
    /// handler address to vector to.
    ///
    /// # Errors
    ///
    /// A [`MemoryAccessError`] raised while saving state or reading the
    /// vector table; latched as an architectural fault.
    fn accept_interrupt(
        &mut self,
        interrupt: IoInterrupt,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<u64, MemoryAccessError>;
}

/// One execution core of a [`super::Processor`].
pub struct ProcessorCore {
    config: CoreConfig,
    mmu: Mmu,
    pc: u64,
    run_state: CoreRunState,
    interrupts_enabled: bool,
    latched_fault: Option<MemoryAccessError>,
    retired: u64,
    isa: Box<dyn InstructionSet>,
}

impl ProcessorCore {
    /// Creates a core in the `Reset` state.
    #[must_use]
    pub fn new(config: CoreConfig, isa: Box<dyn InstructionSet>) -> Self {
        Self {
            config,
            mmu: Mmu::new(config.features),
            pc: config.restart_address,
            run_state: CoreRunState::Reset,
            interrupts_enabled: true,
            latched_fault: None,
            retired: 0,
            isa,
        }
    }

    /// Current execution state.
    #[must_use]
    pub const fn run_state(&self) -> CoreRunState {
        self.run_state
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u64 {
        self.pc
    }

    /// Latched architectural fault, if the core is faulted.
    #[must_use]
    pub const fn latched_fault(&self) -> Option<MemoryAccessError> {
        self.latched_fault
    }

    /// Instructions retired since the last reset.
    #[must_use]
    pub const fn retired(&self) -> u64 {
        self.retired
    }

    /// Mutable MMU access for guest-kernel configuration.
    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    /// Masks or unmasks interrupt acceptance at the step checkpoint.
    pub fn set_interrupts_enabled(&mut self, enabled: bool) {
        self.interrupts_enabled = enabled;
    }

    /// Applies reset semantics: restart address, default features, counters
    /// cleared, state machine back to `Reset`.
    pub fn reset(&mut self) {
        self.pc = self.config.restart_address;
        self.mmu = Mmu::new(self.config.features);
        self.run_state = CoreRunState::Reset;
        self.interrupts_enabled = true;
        self.latched_fault = None;
        self.retired = 0;
    }

    fn latch_fault(&mut self, fault: MemoryAccessError) -> CoreStepOutcome {
        self.run_state = CoreRunState::Faulted;
        self.latched_fault = Some(fault);
        CoreStepOutcome::Faulted(fault)
    }

    /// Advances guest-visible state by one instruction step.
    ///
    /// Checks for a ready, unmasked interrupt first; otherwise fetches one
    /// instruction word through the MMU-translated bus path and delegates to
    /// the architecture glue. Any memory fault latches the core instead of
    /// escaping the emulation loop.
    pub fn step(
        &mut self,
        memory: &mut MemoryBus,
        io: &crate::io::IoBus,
    ) -> CoreStepOutcome {
        match self.run_state {
            CoreRunState::Halted => return CoreStepOutcome::Halted,
            CoreRunState::Faulted => {
                let fault = self
                    .latched_fault
                    .unwrap_or(MemoryAccessError::OutOfRange { addr: self.pc });
                return CoreStepOutcome::Faulted(fault);
            }
            CoreRunState::Reset => self.run_state = CoreRunState::Running,
            CoreRunState::Running => {}
        }

        if self.interrupts_enabled {
            if let Some(interrupt) = io.poll_interrupt() {
                let mut ctx = ExecutionContext {
                    memory,
                    mmu: &self.mmu,
                    byte_order: self.config.byte_order,
                    pc: self.pc,
                };
                return match self.isa.accept_interrupt(interrupt, &mut ctx) {
                    Ok(handler_pc) => {
                        self.pc = handler_pc;
                        CoreStepOutcome::Interrupted(interrupt)
                    }
                    Err(fault) => self.latch_fault(fault),
                };
            }
        }

        if self.pc % INSTRUCTION_BYTES != 0 {
            return self.latch_fault(MemoryAccessError::Misaligned { addr: self.pc });
        }

        let word = match self
            .mmu
            .translate(self.pc)
            .and_then(|physical| memory.load_word(physical, self.config.byte_order))
        {
            Ok(word) => word,
            Err(fault) => return self.latch_fault(fault),
        };

        let mut ctx = ExecutionContext {
            memory,
            mmu: &self.mmu,
            byte_order: self.config.byte_order,
            pc: self.pc,
        };
        match self.isa.execute(word, &mut ctx) {
            Ok(ExecuteOutcome::Retired { next_pc }) => {
                self.pc = next_pc;
                self.retired += 1;
                CoreStepOutcome::Retired
            }
            Ok(ExecuteOutcome::Halt) => {
                self.run_state = CoreRunState::Halted;
                CoreStepOutcome::Halted
            }
            Err(fault) => self.latch_fault(fault),
        }
    }
}
