// Unit tests for the vm crate.
//
// These run on the host against the mock environment from `test-support`:
// frames are real host memory behind an identity mapping, the TLB is a
// recording stub, interrupts are a simulated flag. Tests that observe the
// shared mock state serialize through `vm_test_env`.

extern crate std;

use std::sync::{Mutex, MutexGuard, Once};

use test_support::mock::{
    MOCK_FRAME_ALLOC, MOCK_INTR_CTRL, MOCK_TLB, MOCK_VM_CONFIG, MockFrameAlloc, MockTlb,
    MockVmConfig,
};

use crate::{ArchVmOps, FrameOps, VmConfig};

// The mock types carry inherent methods only; the trait wiring lives here so
// test-support does not depend on this crate.

impl ArchVmOps for MockTlb {
    fn tlb_write_random(&self, entry_hi: usize, entry_lo: usize) {
        self.write_random(entry_hi, entry_lo);
    }

    fn tlb_invalidate_all(&self) {
        self.invalidate_all();
    }

    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        MockTlb::paddr_to_vaddr(self, paddr)
    }
}

impl FrameOps for MockFrameAlloc {
    fn alloc_frames(&self, count: usize, zeroed: bool) -> Option<usize> {
        MockFrameAlloc::alloc_frames(self, count, zeroed)
    }

    fn free_frames(&self, ppn: usize, count: usize) {
        MockFrameAlloc::free_frames(self, ppn, count);
    }
}

impl VmConfig for MockVmConfig {
    fn user_space_top(&self) -> usize {
        MockVmConfig::user_space_top(self)
    }

    fn user_stack_size(&self) -> usize {
        MockVmConfig::user_stack_size(self)
    }
}

// sync::ArchOps is a foreign trait, so it gets a local adapter type.
struct IntrOps;

impl sync::ArchOps for IntrOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        MOCK_INTR_CTRL.read_and_disable()
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        MOCK_INTR_CTRL.restore(flags);
    }

    fn interrupts_enabled(&self, flags: usize) -> bool {
        flags != 0
    }
}

static INTR_OPS: IntrOps = IntrOps;

static ENV_LOCK: Mutex<()> = Mutex::new(());
static INIT: Once = Once::new();

/// Registers the mock environment once, resets the observable mock state and
/// serializes the calling test against every other environment user.
pub(crate) fn vm_test_env() -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    INIT.call_once(|| unsafe {
        sync::register_arch_ops(&INTR_OPS);
        crate::register_arch_ops(&MOCK_TLB);
        crate::register_config(&MOCK_VM_CONFIG);
        crate::register_frame_ops(&MOCK_FRAME_ALLOC);
    });
    MOCK_INTR_CTRL.force_enable();
    MOCK_TLB.reset();
    MOCK_FRAME_ALLOC.set_fail_after(usize::MAX);
    guard
}

mod fault;
mod page_table;
