//! Page table tests: insert/search, duplication, ownership of frames.

use super::vm_test_env;
use crate::address::{PAGE_SIZE, Paddr, UsizeConvert, Vaddr};
use crate::page_table::PageTable;
use crate::region::RegionPerm;
use crate::{VmError, alloc_frame};
use test_support::mock::MOCK_FRAME_ALLOC;

/// Views a mock frame as a byte slice. The mock pool is identity mapped, so
/// the physical address is directly dereferenceable on the host.
fn frame_bytes(paddr: Paddr) -> &'static mut [u8] {
    unsafe { core::slice::from_raw_parts_mut(paddr.as_usize() as *mut u8, PAGE_SIZE) }
}

#[test]
fn test_insert_then_search_finds_the_entry() {
    let _env = vm_test_env();
    let mut pt = PageTable::new().unwrap();

    let frame = alloc_frame(true).unwrap();
    let paddr = frame.ppn().start_addr();
    let perm = RegionPerm::READ | RegionPerm::WRITE;
    pt.insert(frame, Vaddr::from_usize(0x41000), perm).unwrap();

    // Any address inside the page resolves to the same entry.
    let entry = pt.search(Vaddr::from_usize(0x41444)).unwrap();
    assert_eq!(entry.paddr(), paddr);
    assert_eq!(entry.perm(), perm);
    assert_eq!(pt.resident_pages(), 1);

    // The neighbouring page was never touched.
    assert!(pt.search(Vaddr::from_usize(0x42000)).is_none());
}

#[test]
fn test_search_misses_on_untouched_directory_slot() {
    let _env = vm_test_env();
    let pt = PageTable::new().unwrap();
    assert!(pt.search(Vaddr::from_usize(0x7fff_0000)).is_none());
    assert_eq!(pt.resident_pages(), 0);
}

#[test]
fn test_out_of_range_insert_fails_and_returns_the_frame() {
    let _env = vm_test_env();
    let mut pt = PageTable::new().unwrap();
    let baseline = MOCK_FRAME_ALLOC.allocated();

    // Beyond what the two-level format can index.
    let too_high = Vaddr::from_usize(1 << 32);
    let frame = alloc_frame(true).unwrap();
    let err = pt.insert(frame, too_high, RegionPerm::READ);
    assert_eq!(err.map(|_| ()), Err(VmError::InvalidAddress));

    // The table is unchanged and the frame went back to the allocator.
    assert_eq!(pt.resident_pages(), 0);
    assert_eq!(MOCK_FRAME_ALLOC.allocated(), baseline);
    assert!(pt.search(too_high).is_none());
}

#[test]
fn test_dup_copies_content_into_distinct_frames() {
    let _env = vm_test_env();
    let mut pt = PageTable::new().unwrap();

    // Two pages in different directory slots, each with a distinct pattern.
    let pages = [
        (Vaddr::from_usize(0x0000_3000), 0xaau8),
        (Vaddr::from_usize(0x0040_0000), 0x55u8),
    ];
    for &(vaddr, byte) in &pages {
        let frame = alloc_frame(true).unwrap();
        frame_bytes(frame.ppn().start_addr()).fill(byte);
        pt.insert(frame, vaddr, RegionPerm::READ | RegionPerm::WRITE)
            .unwrap();
    }

    let copy = pt.dup().unwrap();
    assert_eq!(copy.resident_pages(), pt.resident_pages());

    for &(vaddr, byte) in &pages {
        let src = pt.search(vaddr).unwrap();
        let dst = copy.search(vaddr).unwrap();
        assert_ne!(src.paddr(), dst.paddr());
        assert_eq!(src.perm(), dst.perm());
        assert!(frame_bytes(dst.paddr()).iter().all(|&b| b == byte));
    }

    // Writes to the copy must not bleed into the original.
    let dst = copy.search(pages[0].0).unwrap();
    frame_bytes(dst.paddr()).fill(0xff);
    let src = pt.search(pages[0].0).unwrap();
    assert!(frame_bytes(src.paddr()).iter().all(|&b| b == 0xaa));
}

#[test]
fn test_dup_failure_releases_partial_allocations() {
    let _env = vm_test_env();
    let baseline = MOCK_FRAME_ALLOC.allocated();
    let mut pt = PageTable::new().unwrap();

    for i in 0..3 {
        let frame = alloc_frame(true).unwrap();
        pt.insert(
            frame,
            Vaddr::from_usize(0x1000 * (i + 1)),
            RegionPerm::READ,
        )
        .unwrap();
    }
    assert_eq!(MOCK_FRAME_ALLOC.allocated(), baseline + 3);

    // Let one frame through, then fail. The half-built copy must be torn
    // down without leaking its one allocated frame.
    MOCK_FRAME_ALLOC.set_fail_after(1);
    let err = pt.dup().map(|_| ());
    assert_eq!(err, Err(VmError::OutOfMemory));
    assert_eq!(MOCK_FRAME_ALLOC.allocated(), baseline + 3);
}

#[test]
fn test_drop_frees_every_resident_frame() {
    let _env = vm_test_env();
    let baseline = MOCK_FRAME_ALLOC.allocated();

    {
        let mut pt = PageTable::new().unwrap();
        for i in 0..4 {
            let frame = alloc_frame(true).unwrap();
            pt.insert(
                frame,
                // Spread across two directory slots.
                Vaddr::from_usize(0x1000 * (i + 1) + (i % 2) * 0x0040_0000),
                RegionPerm::READ,
            )
            .unwrap();
        }
        assert_eq!(MOCK_FRAME_ALLOC.allocated(), baseline + 4);
    }

    assert_eq!(MOCK_FRAME_ALLOC.allocated(), baseline);
}
