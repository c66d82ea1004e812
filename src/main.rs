//! # jiffos Demo Firmware
//!
//! Three tasks on a Cortex-M4 showing the scheduler's behaviour:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `consumer_task` | 15 | Sleeps on a wait slot woken by a timer every 50 ticks |
//! | `cpu_bound_task` | 5 | Busy-loops; only the tick takes the CPU away |
//! | `reporter_task` | 15 | Arms a 2 s alarm, pauses, dumps the task table |
//!
//! The consumer is asleep most of the time, so every aging round tops its
//! credit up while the CPU-bound task burns through its own; when the timer
//! wakes it, it wins the next decision.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use jiffos::arch::cortex_m4::{self, kernel};
use jiffos::scheduler::Scheduler;
use jiffos::signal::SigSet;
use jiffos::task::TaskParams;
use jiffos::wait::WaitSlot;

static DATA_READY: WaitSlot = WaitSlot::new();

/// Timer callback standing in for a device interrupt.
fn data_ready(s: &mut Scheduler) {
    s.wake_up(&DATA_READY);
}

extern "C" fn consumer_task() {
    let mut batches: u32 = 0;
    loop {
        kernel().add_timer(50, data_ready);
        kernel().sleep_on(&DATA_READY);
        batches = batches.wrapping_add(1);
    }
}

extern "C" fn cpu_bound_task() {
    let mut counter: u32 = 0;
    loop {
        counter = core::hint::black_box(counter.wrapping_add(1));
    }
}

extern "C" fn reporter_task() {
    loop {
        kernel().alarm(2);
        kernel().pause();
        kernel().with(|s| {
            if let Some(me) = s.current_task_mut() {
                me.signal.remove(SigSet::SIGALRM);
            }
        });
        kernel().show_stat();
    }
}

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().expect("core peripherals taken twice");

    cortex_m4::spawn(consumer_task, TaskParams::new(1)).expect("spawn consumer_task");
    cortex_m4::spawn(cpu_bound_task, TaskParams::new(2).with_priority(5))
        .expect("spawn cpu_bound_task");
    cortex_m4::spawn(reporter_task, TaskParams::new(3).with_pgrp(1))
        .expect("spawn reporter_task");

    cortex_m4::start(cp)
}
