//! # Cortex-M4 Port
//!
//! Runs the kernel on an ARM Cortex-M4 (Thumb-2): SysTick is the tick
//! source, PendSV performs the context switch.
//!
//! ## Context Switch Mechanism
//!
//! Tasks run in Thread mode on PSP, each on its own kernel stack. On
//! exception entry the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! PSP; PendSV pushes R4–R11 below that and records the resulting PSP in
//! the outgoing task's `context` word. It then loads the `context` of
//! whatever task the scheduler made `current` and unwinds the same way.
//!
//! The scheduler's `current` changes as soon as a decision is made, while
//! the CPU only changes at PendSV, so the port tracks the task actually on
//! the CPU separately (`ON_CPU`).
//!
//! ## Privilege
//!
//! Tasks and the kernel entry points they call share Thread mode, so the
//! hardware cannot tell them apart. The tick asks the kernel instead
//! ([`Kernel::tick`]): a task between the halves of a sleep primitive
//! counts as kernel mode.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at the lowest priority, so neither preempts
//! device ISRs and PendSV tail-chains after any other handler. A switch is
//! pended inside the kernel's critical section; when interrupts come back
//! with both pending, PendSV (exception 14) is taken before SysTick (15), so
//! a tick is never charged to a task that is not yet on the CPU.

use core::arch::{asm, naked_asm};
use core::cell::Cell;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m_rt::exception;
use log::error;

use crate::arch::ContextSwitch;
use crate::config::{HZ, SYSTEM_CLOCK_HZ};
use crate::error::SchedError;
use crate::kernel::Kernel;
use crate::scheduler::Switch;
use crate::sync::{self, Mutex};
use crate::task::{Task, TaskHandle, TaskParams};

/// The Cortex-M4 context-switch port.
pub struct CortexM4;

static KERNEL: Kernel<CortexM4> = Kernel::new(CortexM4);

/// The task whose registers are live on the CPU.
static ON_CPU: Mutex<Cell<TaskHandle>> = Mutex::new(Cell::new(TaskHandle::IDLE));

/// The kernel instance this port drives.
pub fn kernel() -> &'static Kernel<CortexM4> {
    &KERNEL
}

impl ContextSwitch for CortexM4 {
    /// Pend PendSV. It is taken as soon as the kernel's critical section
    /// ends, or when the handler chain unwinds if called from an ISR.
    fn switch_to(&self, _switch: Switch) {
        SCB::set_pendsv();
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Words in the initial frame: R4–R11, then the hardware frame.
const FRAME_WORDS: usize = 16;

/// Thumb state bit; the only xPSR bit a fresh task needs.
const XPSR_THUMB: u32 = 0x0100_0000;

/// Lay out a frame on `task`'s stack that PendSV will unwind into `entry`,
/// with `task_exit` as the return address.
fn init_stack(task: &mut Task, entry: extern "C" fn()) {
    let mut frame = [0u32; FRAME_WORDS];
    frame[13] = task_exit as usize as u32; // LR
    frame[14] = entry as usize as u32 & !1; // PC
    frame[15] = XPSR_THUMB;

    let stack = task.stack.as_mut_slice();
    let base = stack.len() - FRAME_WORDS * 4;
    for (chunk, word) in stack[base..].chunks_exact_mut(4).zip(frame) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    task.context = stack.as_ptr() as usize + base;
}

/// Create a task that starts at `entry`. Returning from `entry` exits it.
pub fn spawn(entry: extern "C" fn(), params: TaskParams) -> Result<TaskHandle, SchedError> {
    KERNEL.spawn_with(params, |task| init_stack(task, entry))
}

extern "C" fn task_exit() -> ! {
    let exited = KERNEL.exit_current();
    if let Err(err) = exited {
        error!("task_exit: {}", err);
    }
    debug_assert!(exited.is_ok(), "returning task could not exit");
    loop {
        cortex_m::asm::wfi();
    }
}

extern "C" fn idle_loop() -> ! {
    loop {
        KERNEL.schedule();
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

fn configure_systick(syst: &mut SYST) {
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(SYSTEM_CLOCK_HZ / HZ - 1);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
}

fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: changing these priorities cannot break a priority-based
    // critical section; the kernel's critical sections mask all interrupts.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

/// Start ticking and become the idle task. **Does not return.**
pub fn start(mut cp: cortex_m::Peripherals) -> ! {
    cortex_m::interrupt::disable();

    configure_systick(&mut cp.SYST);
    set_interrupt_priorities(&mut cp.SCB);

    let idle_top = KERNEL.with(|s| {
        s.tasks
            .get_mut(TaskHandle::IDLE)
            .map_or(0, |idle| idle.stack.top() as usize)
    });
    sync::critical_section(|cs| ON_CPU.borrow(cs).set(TaskHandle::IDLE));

    // SAFETY: the idle stack lives in a static and is not in use yet;
    // interrupts stay disabled until we are on it.
    unsafe { enter_idle(idle_top) }
}

/// Move Thread mode onto PSP at `psp`, enable interrupts and jump to the
/// idle loop.
unsafe fn enter_idle(psp: usize) -> ! {
    asm!(
        "msr psp, r0",
        "movs r0, #2",         // CONTROL.SPSEL = 1
        "msr control, r0",
        "isb",
        "cpsie i",
        "bx r1",
        in("r0") psp,
        in("r1") idle_loop as usize,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    KERNEL.tick();
}

/// Saves R4–R11 of the outgoing task, swaps stacks through
/// `swap_context`, restores R4–R11 of the incoming one.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {swap}",           // r0: saved PSP in, next PSP out
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD", // Thread mode, PSP
        "bx r0",
        swap = sym swap_context,
    );
}

/// Record the outgoing task's stack pointer and return the incoming one's.
/// A task whose slot was cleared while it ran is simply not saved.
extern "C" fn swap_context(psp: usize) -> usize {
    KERNEL.with(|s| {
        sync::critical_section(|cs| {
            let on_cpu = ON_CPU.borrow(cs);
            if let Some(prev) = s.tasks.get_mut(on_cpu.get()) {
                prev.context = psp;
            }
            let next = s.current();
            match s.tasks.get(next) {
                Some(task) => {
                    on_cpu.set(next);
                    task.context
                }
                None => psp,
            }
        })
    })
}
