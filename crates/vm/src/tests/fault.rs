//! Fault handler tests: demand paging, permission enforcement, TLB writes.

use super::vm_test_env;
use crate::addr_space::AddressSpace;
use crate::address::{PAGE_SIZE, UsizeConvert, Vaddr};
use crate::fault::{FaultKind, handle_fault, tlb_shootdown};
use crate::{TlbFlags, VmError};
use test_support::mock::{MOCK_FRAME_ALLOC, MOCK_TLB};

fn space_with_region(start: usize, size: usize, writable: bool) -> AddressSpace {
    let mut space = AddressSpace::new().unwrap();
    space
        .define_region(Vaddr::from_usize(start), size, true, writable, false)
        .unwrap();
    space
}

#[test]
fn test_null_and_kernel_addresses_are_rejected() {
    let _env = vm_test_env();
    let mut space = AddressSpace::new().unwrap();

    for addr in [0, 0x8000_0000, 0x9000_0000] {
        let err = handle_fault(Some(&mut space), FaultKind::Read, Vaddr::from_usize(addr));
        assert_eq!(err, Err(VmError::InvalidAddress));
    }
    assert_eq!(MOCK_TLB.random_writes(), 0);
}

#[test]
fn test_fault_without_an_address_space_is_invalid() {
    let _env = vm_test_env();
    let err = handle_fault(None, FaultKind::Read, Vaddr::from_usize(0x1500));
    assert_eq!(err, Err(VmError::InvalidAddress));
    assert_eq!(MOCK_TLB.random_writes(), 0);
}

#[test]
fn test_spurious_readonly_fault_is_invalid() {
    let _env = vm_test_env();
    let mut space = space_with_region(0x1000, 0x2000, true);

    handle_fault(Some(&mut space), FaultKind::Write, Vaddr::from_usize(0x1500)).unwrap();
    let writes = MOCK_TLB.random_writes();

    // Loaded entries are never hardware read-only, so this cannot happen on
    // a consistent machine.
    let err = handle_fault(Some(&mut space), FaultKind::ReadOnly, Vaddr::from_usize(0x1500));
    assert_eq!(err, Err(VmError::InvalidAddress));
    assert_eq!(MOCK_TLB.random_writes(), writes);
}

#[test]
fn test_unmapped_address_is_not_extended() {
    let _env = vm_test_env();
    let baseline = MOCK_FRAME_ALLOC.allocated();
    let mut space = space_with_region(0x1000, 0x2000, true);

    let err = handle_fault(Some(&mut space), FaultKind::Read, Vaddr::from_usize(0x5000));
    assert_eq!(err, Err(VmError::InvalidAddress));
    assert_eq!(MOCK_TLB.random_writes(), 0);
    assert_eq!(MOCK_FRAME_ALLOC.allocated(), baseline);
    assert_eq!(space.page_table().resident_pages(), 0);
}

#[test]
fn test_write_fault_allocates_one_zeroed_frame_and_sets_dirty() {
    let _env = vm_test_env();
    let baseline = MOCK_FRAME_ALLOC.allocated();
    let mut space = space_with_region(0x1000, 0x2000, true);

    handle_fault(Some(&mut space), FaultKind::Write, Vaddr::from_usize(0x1500)).unwrap();

    assert_eq!(MOCK_FRAME_ALLOC.allocated(), baseline + 1);
    assert_eq!(MOCK_TLB.random_writes(), 1);

    let entry = space.page_table().search(Vaddr::from_usize(0x1500)).unwrap();
    let (hi, lo) = MOCK_TLB.last_entry();
    assert_eq!(hi, 0x1000);
    assert_eq!(lo & !(TlbFlags::all().bits()), entry.paddr().as_usize());
    assert_ne!(lo & TlbFlags::VALID.bits(), 0);
    assert_ne!(lo & TlbFlags::DIRTY.bits(), 0);

    // The freshly allocated frame starts out zeroed.
    let bytes = unsafe {
        core::slice::from_raw_parts(entry.paddr().as_usize() as *const u8, PAGE_SIZE)
    };
    assert!(bytes.iter().all(|&b| b == 0));

    // The region that backed the fault still guards later defines.
    let err = space.define_region(Vaddr::from_usize(0x1800), 0x1000, true, true, false);
    assert_eq!(err, Err(VmError::RegionConflict));
}

#[test]
fn test_second_fault_on_the_same_page_reuses_the_entry() {
    let _env = vm_test_env();
    let baseline = MOCK_FRAME_ALLOC.allocated();
    let mut space = space_with_region(0x1000, 0x2000, true);

    handle_fault(Some(&mut space), FaultKind::Write, Vaddr::from_usize(0x1500)).unwrap();
    handle_fault(Some(&mut space), FaultKind::Read, Vaddr::from_usize(0x1abc)).unwrap();

    // Same page, so no second frame, but the evicted translation is
    // reprogrammed into the TLB.
    assert_eq!(MOCK_FRAME_ALLOC.allocated(), baseline + 1);
    assert_eq!(MOCK_TLB.random_writes(), 2);
}

#[test]
fn test_readonly_region_entry_is_clean() {
    let _env = vm_test_env();
    let mut space = space_with_region(0x1000, 0x1000, false);

    handle_fault(Some(&mut space), FaultKind::Read, Vaddr::from_usize(0x1000)).unwrap();

    let (_, lo) = MOCK_TLB.last_entry();
    assert_ne!(lo & TlbFlags::VALID.bits(), 0);
    assert_eq!(lo & TlbFlags::DIRTY.bits(), 0);
}

#[test]
fn test_load_window_permits_writes_to_readonly_regions() {
    let _env = vm_test_env();
    let mut space = space_with_region(0x1000, 0x2000, false);

    // While the image is being loaded, writes to the nominally read-only
    // segment must go through.
    space.prepare_load();
    handle_fault(Some(&mut space), FaultKind::Write, Vaddr::from_usize(0x1000)).unwrap();
    let (_, lo) = MOCK_TLB.last_entry();
    assert_ne!(lo & TlbFlags::DIRTY.bits(), 0);

    // After the window closes, a fresh page comes up clean again.
    space.complete_load();
    handle_fault(Some(&mut space), FaultKind::Read, Vaddr::from_usize(0x2000)).unwrap();
    let (_, lo) = MOCK_TLB.last_entry();
    assert_ne!(lo & TlbFlags::VALID.bits(), 0);
    assert_eq!(lo & TlbFlags::DIRTY.bits(), 0);
}

#[test]
fn test_frame_exhaustion_reports_out_of_memory() {
    let _env = vm_test_env();
    let mut space = space_with_region(0x1000, 0x1000, true);

    MOCK_FRAME_ALLOC.set_fail_after(0);
    let err = handle_fault(Some(&mut space), FaultKind::Write, Vaddr::from_usize(0x1000));
    assert_eq!(err, Err(VmError::OutOfMemory));
    assert_eq!(MOCK_TLB.random_writes(), 0);
    assert_eq!(space.page_table().resident_pages(), 0);
}

#[test]
fn test_fault_kind_from_code() {
    assert_eq!(FaultKind::from_code(0), Ok(FaultKind::Read));
    assert_eq!(FaultKind::from_code(1), Ok(FaultKind::Write));
    assert_eq!(FaultKind::from_code(2), Ok(FaultKind::ReadOnly));
    assert_eq!(FaultKind::from_code(99), Err(VmError::BadFaultKind));
}

#[test]
#[should_panic(expected = "TLB shootdown")]
fn test_tlb_shootdown_panics() {
    tlb_shootdown();
}
