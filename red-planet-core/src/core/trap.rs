use bitvec::{field::BitField, order::Lsb0, view::BitView};

use super::{Exception, Interrupt};
use crate::PrivilegeLevel;

/// Combines the trap vector, delegation, address-translation and interrupt-pending/enable state
/// that is consulted whenever a trap is taken, together with the scratch/epc/cause/tval registers
/// that record the details of the most recently taken trap at each privilege level.
#[derive(Debug, Clone)]
pub struct Trap {
    mscratch: u32,
    mepc: u32,
    pub mcause: Cause,
    mtval: u32,
    mtinst: u32,
    mtval2: u32,
    pub mtvec: Tvec,
    pub medeleg: Medeleg,
    pub mideleg: Mideleg,

    sscratch: u32,
    sepc: u32,
    pub scause: Cause,
    stval: u32,
    pub stvec: Tvec,

    pub satp: Satp,

    mie: u32,
    /// Raw contents of `mip`, except for the SEIP bit, which is reconstructed on every read as the
    /// logical-OR of [`Self::seip_external`] and [`Self::seip_internal`].
    mip: u32,
    /// Pending external interrupt signal, as last set through [`Self::set_s_external`] by the
    /// platform's interrupt controller.
    seip_external: bool,
    /// Software-writable shadow of the SEIP bit, set through a write to the `mip` CSR.
    seip_internal: bool,
}

impl Default for Trap {
    fn default() -> Self {
        Self::new()
    }
}

impl Trap {
    pub fn new() -> Self {
        Self {
            mscratch: 0,
            mepc: 0,
            mcause: Cause::new(),
            mtval: 0,
            mtinst: 0,
            mtval2: 0,
            mtvec: Tvec::new(),
            medeleg: Medeleg::new(),
            mideleg: Mideleg::new(),
            sscratch: 0,
            sepc: 0,
            scause: Cause::new(),
            stval: 0,
            stvec: Tvec::new(),
            satp: Satp::new(),
            mie: 0,
            mip: 0,
            seip_external: false,
            seip_internal: false,
        }
    }

    pub fn read_mscratch(&self) -> u32 {
        self.mscratch
    }

    pub fn write_mscratch(&mut self, value: u32, mask: u32) {
        self.mscratch = self.mscratch & !mask | value & mask;
    }

    pub fn read_mepc(&self) -> u32 {
        self.mepc
    }

    /// Writes to `mepc`, clearing bit 0, since `pc` is always at least 2-byte aligned.
    pub fn write_mepc(&mut self, value: u32, mask: u32) {
        self.mepc = (self.mepc & !mask | value & mask) & !1;
    }

    pub fn read_mtval(&self) -> u32 {
        self.mtval
    }

    pub fn write_mtval(&mut self, value: u32, mask: u32) {
        self.mtval = self.mtval & !mask | value & mask;
    }

    pub fn read_mtinst(&self) -> u32 {
        self.mtinst
    }

    pub fn write_mtinst(&mut self, value: u32, mask: u32) {
        self.mtinst = self.mtinst & !mask | value & mask;
    }

    pub fn read_mtval2(&self) -> u32 {
        self.mtval2
    }

    pub fn write_mtval2(&mut self, value: u32, mask: u32) {
        self.mtval2 = self.mtval2 & !mask | value & mask;
    }

    pub fn read_sscratch(&self) -> u32 {
        self.sscratch
    }

    pub fn write_sscratch(&mut self, value: u32, mask: u32) {
        self.sscratch = self.sscratch & !mask | value & mask;
    }

    pub fn read_sepc(&self) -> u32 {
        self.sepc
    }

    /// Writes to `sepc`, clearing bit 0, since `pc` is always at least 2-byte aligned.
    pub fn write_sepc(&mut self, value: u32, mask: u32) {
        self.sepc = (self.sepc & !mask | value & mask) & !1;
    }

    pub fn read_stval(&self) -> u32 {
        self.stval
    }

    pub fn write_stval(&mut self, value: u32, mask: u32) {
        self.stval = self.stval & !mask | value & mask;
    }

    /// Bit mask of the interrupts that are representable in `mip`/`mie`.
    const VALID_INTERRUPTS_MASK: u32 = (1 << Interrupt::SupervisorSoftwareInterrupt.code())
        | (1 << Interrupt::MachineSoftwareInterrupt.code())
        | (1 << Interrupt::SupervisorTimerInterrupt.code())
        | (1 << Interrupt::MachineTimerInterrupt.code())
        | (1 << Interrupt::SupervisorExternalInterrupt.code())
        | (1 << Interrupt::MachineExternalInterrupt.code());

    /// Bit mask of the interrupts visible through `sip`/`sie`.
    const S_INTERRUPTS_MASK: u32 = (1 << Interrupt::SupervisorSoftwareInterrupt.code())
        | (1 << Interrupt::SupervisorTimerInterrupt.code())
        | (1 << Interrupt::SupervisorExternalInterrupt.code());

    fn seip(&self) -> bool {
        self.seip_external || self.seip_internal
    }

    fn effective_mip(&self) -> u32 {
        let seip_bit = 1 << Interrupt::SupervisorExternalInterrupt.code();
        if self.seip() {
            self.mip | seip_bit
        } else {
            self.mip & !seip_bit
        }
    }

    pub fn read_mip(&self) -> u32 {
        self.effective_mip()
    }

    /// Only the SSIP, STIP and (the software-writable shadow of) SEIP bits are writable; the
    /// remaining bits, including MSIP/MTIP/MEIP, are set exclusively by the platform.
    pub fn write_mip(&mut self, value: u32, mask: u32) {
        let ssip = 1 << Interrupt::SupervisorSoftwareInterrupt.code();
        let stip = 1 << Interrupt::SupervisorTimerInterrupt.code();
        let seip = 1 << Interrupt::SupervisorExternalInterrupt.code();
        let writable_mask = mask & (ssip | stip);
        self.mip = self.mip & !writable_mask | value & writable_mask;
        if mask & seip != 0 {
            self.seip_internal = value & seip != 0;
        }
    }

    pub fn read_mie(&self) -> u32 {
        self.mie
    }

    pub fn write_mie(&mut self, value: u32, mask: u32) {
        let mask = mask & Self::VALID_INTERRUPTS_MASK;
        self.mie = self.mie & !mask | value & mask;
    }

    pub fn read_sip(&self) -> u32 {
        self.effective_mip() & Self::S_INTERRUPTS_MASK
    }

    /// Only the SSIP bit is writable through `sip`; STIP and SEIP are read-only shadows.
    pub fn write_sip(&mut self, value: u32, mask: u32) {
        let ssip = 1 << Interrupt::SupervisorSoftwareInterrupt.code();
        self.write_mip(value, mask & ssip);
    }

    pub fn read_sie(&self) -> u32 {
        self.mie & Self::S_INTERRUPTS_MASK
    }

    pub fn write_sie(&mut self, value: u32, mask: u32) {
        self.write_mie(value, mask & Self::S_INTERRUPTS_MASK);
    }

    /// Raised by the platform whenever the machine-level external interrupt line changes state.
    pub fn set_m_external(&mut self, pending: bool) {
        let meip = 1 << Interrupt::MachineExternalInterrupt.code();
        self.mip = self.mip & !meip | if pending { meip } else { 0 };
    }

    /// Raised by the platform whenever the supervisor-level external interrupt line (as reported
    /// by the platform-level interrupt controller) changes state.
    ///
    /// The SEIP bit reported in `mip` is the logical-OR of this signal and the software-writable
    /// shadow bit set through a CSR write.
    pub fn set_s_external(&mut self, pending: bool) {
        self.seip_external = pending;
    }

    pub fn set_m_timer(&mut self, pending: bool) {
        let mtip = 1 << Interrupt::MachineTimerInterrupt.code();
        self.mip = self.mip & !mtip | if pending { mtip } else { 0 };
    }

    pub fn set_m_soft(&mut self, pending: bool) {
        let msip = 1 << Interrupt::MachineSoftwareInterrupt.code();
        self.mip = self.mip & !msip | if pending { msip } else { 0 };
    }

    pub fn satp_mode(&self) -> SatpMode {
        self.satp.mode()
    }

    pub fn satp_ppn(&self) -> u32 {
        self.satp.ppn()
    }

    /// Returns the highest-priority pending-and-enabled interrupt to be taken next, if any.
    ///
    /// `pending = mie & mip` is split by `mideleg` into the subset handled in M-mode and the
    /// subset delegated to S-mode. Within each subset, an interrupt is only actually taken if
    /// `current_mode` is strictly below the target mode, or equal to it with the target mode's
    /// `mstatus.xIE` bit set (`mie_enabled`/`sie_enabled`). Priority among simultaneously pending
    /// interrupts follows the order mandated by the privileged spec: MEI, MSI, MTI, SEI, SSI, STI.
    pub fn pending_interrupt(
        &self,
        current_mode: PrivilegeLevel,
        mie_enabled: bool,
        sie_enabled: bool,
    ) -> Option<Interrupt> {
        let pending = self.effective_mip() & self.mie;
        if pending == 0 {
            return None;
        }
        const ORDER: [Interrupt; 6] = [
            Interrupt::MachineExternalInterrupt,
            Interrupt::MachineSoftwareInterrupt,
            Interrupt::MachineTimerInterrupt,
            Interrupt::SupervisorExternalInterrupt,
            Interrupt::SupervisorSoftwareInterrupt,
            Interrupt::SupervisorTimerInterrupt,
        ];
        ORDER.into_iter().find(|interrupt| {
            let bit = 1 << interrupt.code();
            if pending & bit == 0 {
                return false;
            }
            let target = if self.mideleg.should_delegate(*interrupt) {
                PrivilegeLevel::Supervisor
            } else {
                PrivilegeLevel::Machine
            };
            match target {
                PrivilegeLevel::Machine => current_mode < PrivilegeLevel::Machine || mie_enabled,
                PrivilegeLevel::Supervisor => {
                    current_mode < PrivilegeLevel::Supervisor
                        || (current_mode == PrivilegeLevel::Supervisor && sie_enabled)
                }
                PrivilegeLevel::User => {
                    unreachable!("interrupts are never delegated past S-mode in this core")
                }
            }
        })
    }
}

/// The `mcause`/`scause` registers, recording the cause of the most recently taken trap at the
/// respective privilege level.
#[derive(Debug, Clone)]
pub struct Cause(u32);

impl Default for Cause {
    fn default() -> Self {
        Self::new()
    }
}

impl Cause {
    /// The MSB of `mcause`/`scause` is set for interrupts, and clear for exceptions.
    const INTERRUPT_BIT: u32 = 1 << 31;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        self.0 = self.0 & !mask | value & mask;
    }

    pub fn set(&mut self, cause: &TrapCause) {
        self.0 = match cause {
            TrapCause::Exception(exception) => exception.code(),
            TrapCause::Interrupt(interrupt) => interrupt.code() | Self::INTERRUPT_BIT,
        };
    }

    /// Sets the register to report a (non-)exception, for use on reset.
    pub fn set_exception(&mut self, exception: Option<Exception>) {
        self.0 = exception.map(|exception| exception.code()).unwrap_or(0);
    }

    /// Sets the register to report a (non-)interrupt, for use on NMI.
    pub fn set_interrupt(&mut self, interrupt: Option<Interrupt>) {
        self.0 = interrupt
            .map(|interrupt| interrupt.code() | Self::INTERRUPT_BIT)
            .unwrap_or(0);
    }
}

/// Either an [`Exception`] or an [`Interrupt`], i.e. anything that can cause a trap.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrapCause {
    Exception(Exception),
    Interrupt(Interrupt),
}

impl From<Exception> for TrapCause {
    fn from(exception: Exception) -> Self {
        Self::Exception(exception)
    }
}

impl From<Interrupt> for TrapCause {
    fn from(interrupt: Interrupt) -> Self {
        Self::Interrupt(interrupt)
    }
}

/// Trap Vector Base Address Register (`mtvec` and `stvec`).
///
/// # mtvec
///
/// > The mtvec register is an MXLEN-bit WARL read/write register that holds trap vector
/// > configuration, consisting of a vector base address (BASE) and a vector mode (MODE).
///
/// > When MODE=Direct, all traps into machine mode cause the pc to be set to the address in the
/// > BASE field. When MODE=Vectored, all synchronous exceptions into machine mode cause the pc to
/// > be set to the address in the BASE field, whereas interrupts cause the pc to be set to the
/// > address in the BASE field plus four times the interrupt cause number.
///
/// # stvec
///
/// Same encoding, used for traps delegated to (or otherwise taken in) S-mode.
#[derive(Debug, Clone)]
pub struct Tvec(u32);

impl Default for Tvec {
    fn default() -> Self {
        Self::new()
    }
}

impl Tvec {
    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        let new_value = self.0 & !mask | value & mask;
        if new_value & 0b11 >= 2 {
            // Reserved MODE. Since this is a WARL register, we can set the register to any legal
            // value here. Choose to preserve the old value, matching the behavior of QEMU's
            // implementation.
        } else {
            self.0 = new_value;
        }
    }

    /// Returns the vector base address (stored in the BASE field).
    pub fn base(&self) -> u32 {
        self.0.view_bits::<Lsb0>()[2..].load_le::<u32>() << 2
    }

    /// Returns the vector mode (stored in the MODE field).
    pub fn mode(&self) -> VectorMode {
        match self.0.view_bits::<Lsb0>()[0] {
            false => VectorMode::Direct,
            true => VectorMode::Vectored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMode {
    Direct,
    Vectored,
}

/// The `medeleg` register is **WARL**; only the standard synchronous exceptions can be delegated.
#[derive(Debug, Clone)]
pub struct Medeleg(u32);

impl Default for Medeleg {
    fn default() -> Self {
        Self::new()
    }
}

impl Medeleg {
    // Delegatable exceptions according to QEMU's implementation.
    #[allow(clippy::identity_op)]
    const DELEGATABLE_EXCEPTIONS_MASK: u32 = 0
        | (1 << Exception::INSTRUCTION_ADDRESS_MISALIGNED)
        | (1 << Exception::INSTRUCTION_ACCESS_FAULT)
        | (1 << Exception::ILLEGAL_INSTRUCTION)
        | (1 << Exception::BREAKPOINT)
        | (1 << Exception::LOAD_ADDRESS_MISALIGNED)
        | (1 << Exception::LOAD_ACCESS_FAULT)
        | (1 << Exception::STORE_OR_AMO_ADDRESS_MISALIGNED)
        | (1 << Exception::STORE_OR_AMO_ACCESS_FAULT)
        | (1 << Exception::ENVIRONMENT_CALL_FROM_U_MODE)
        | (1 << Exception::ENVIRONMENT_CALL_FROM_S_MODE)
        | (1 << Exception::ENVIRONMENT_CALL_FROM_M_MODE)
        | (1 << Exception::INSTRUCTION_PAGE_FAULT)
        | (1 << Exception::LOAD_PAGE_FAULT)
        | (1 << Exception::STORE_OR_AMO_PAGE_FAULT);

    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        self.0 = self.0 & !mask | value & mask & Self::DELEGATABLE_EXCEPTIONS_MASK;
    }

    pub fn should_delegate(&self, exception: Exception) -> bool {
        self.0 & (1 << exception.code()) != 0
    }
}

/// The `mideleg` register is **WARL**; only the S-mode interrupts can be delegated.
#[derive(Debug, Clone)]
pub struct Mideleg(u32);

impl Default for Mideleg {
    fn default() -> Self {
        Self::new()
    }
}

impl Mideleg {
    const DELEGATABLE_INTERRUPTS_MASK: u32 = (1 << Interrupt::SupervisorSoftwareInterrupt.code())
        | (1 << Interrupt::SupervisorTimerInterrupt.code())
        | (1 << Interrupt::SupervisorExternalInterrupt.code());

    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        self.0 = self.0 & !mask | value & mask & Self::DELEGATABLE_INTERRUPTS_MASK;
    }

    pub fn should_delegate(&self, interrupt: Interrupt) -> bool {
        self.0 & (1 << interrupt.code()) != 0
    }
}

/// Supervisor Address Translation and Protection register (`satp`).
///
/// Only `Bare` and `Sv32` modes are supported; any other value written to the MODE field is
/// rejected, per the WARL semantics of this register (the prior value is preserved).
#[derive(Debug, Clone)]
pub struct Satp(u32);

impl Default for Satp {
    fn default() -> Self {
        Self::new()
    }
}

impl Satp {
    const MODE_BIT: u32 = 1 << 31;
    const PPN_MASK: u32 = (1 << 22) - 1;

    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        let new_value = self.0 & !mask | value & mask;
        // Both possible values of the single-bit MODE field (`Bare` and `Sv32`) are legal, so
        // every write is accepted.
        self.0 = new_value;
    }

    pub fn mode(&self) -> SatpMode {
        match self.0 & Self::MODE_BIT != 0 {
            false => SatpMode::Bare,
            true => SatpMode::Sv32,
        }
    }

    /// Returns the physical page number of the root page table, as stored in the PPN field.
    ///
    /// Meaningless when [`Self::mode`] is [`SatpMode::Bare`].
    pub fn ppn(&self) -> u32 {
        self.0 & Self::PPN_MASK
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SatpMode {
    Bare,
    Sv32,
}
