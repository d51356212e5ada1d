//! 虚拟内存相关操作的 Mock 实现
//!
//! 帧分配器用宿主机内存做后备存储并采用恒等映射（paddr == vaddr），
//! 因此测试中通过物理地址访问帧内容时读写的是真实内存。
//! TLB 用计数器和"最后一次写入"记录模拟，配置提供固定的地址空间布局。

use core::alloc::Layout;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// 页大小（与 vm crate 的页几何一致）
const PAGE_SIZE: usize = 4096;
/// Mock 帧池的帧数
const POOL_FRAMES: usize = 512;

// ============================================================================
// MockFrameAlloc - 帧分配器 Mock
// ============================================================================

/// Mock 的物理帧分配器
///
/// 在第一次分配时从宿主机堆上取一块页对齐的区域作为帧池，
/// 用位图跟踪分配状态。提供分配计数和"若干次后分配失败"的开关，
/// 供测试断言精确的分配/回收行为与失败回滚路径。
pub struct MockFrameAlloc {
    /// 帧池基址（0 表示尚未初始化）
    base: AtomicUsize,
    /// 位图扫描的互斥标志
    scan_lock: AtomicBool,
    /// 位图（每个 bit 表示一个帧：0=空闲，1=已分配）
    bitmap: [AtomicU64; POOL_FRAMES / 64],
    /// 当前已分配帧数
    allocated: AtomicUsize,
    /// 还允许成功的分配次数（usize::MAX 表示不限制）
    fail_after: AtomicUsize,
}

impl MockFrameAlloc {
    pub const fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            base: AtomicUsize::new(0),
            scan_lock: AtomicBool::new(false),
            bitmap: [ZERO; POOL_FRAMES / 64],
            allocated: AtomicUsize::new(0),
            fail_after: AtomicUsize::new(usize::MAX),
        }
    }

    /// 确保帧池已初始化，返回基址
    fn pool_base(&self) -> usize {
        let base = self.base.load(Ordering::Acquire);
        if base != 0 {
            return base;
        }
        let layout = Layout::from_size_align(POOL_FRAMES * PAGE_SIZE, PAGE_SIZE)
            .expect("mock frame pool layout");
        // SAFETY: layout 非零大小且对齐合法
        let ptr = unsafe { alloc::alloc::alloc(layout) } as usize;
        assert!(ptr != 0, "mock frame pool allocation failed");
        match self
            .base
            .compare_exchange(0, ptr, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => ptr,
            Err(current) => {
                // 另一个线程已经初始化，释放这块
                // SAFETY: ptr 是刚用相同 layout 分配的
                unsafe { alloc::alloc::dealloc(ptr as *mut u8, layout) };
                current
            }
        }
    }

    /// 在持有扫描锁的情况下执行 f
    fn with_scan_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        while self
            .scan_lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        let result = f();
        self.scan_lock.store(false, Ordering::Release);
        result
    }

    fn bit(&self, idx: usize) -> bool {
        self.bitmap[idx / 64].load(Ordering::Relaxed) & (1u64 << (idx % 64)) != 0
    }

    fn set_bit(&self, idx: usize) {
        self.bitmap[idx / 64].fetch_or(1u64 << (idx % 64), Ordering::Relaxed);
    }

    fn clear_bit(&self, idx: usize) {
        self.bitmap[idx / 64].fetch_and(!(1u64 << (idx % 64)), Ordering::Relaxed);
    }

    /// 分配 count 个连续帧，返回起始物理页号
    pub fn alloc_frames(&self, count: usize, zeroed: bool) -> Option<usize> {
        if count == 0 || count > POOL_FRAMES {
            return None;
        }
        let base = self.pool_base();
        let start = self.with_scan_lock(|| {
            let remaining = self.fail_after.load(Ordering::Relaxed);
            if remaining == 0 {
                return None;
            }
            if remaining != usize::MAX {
                self.fail_after.store(remaining - 1, Ordering::Relaxed);
            }

            let mut run = 0;
            let mut run_start = 0;
            for idx in 0..POOL_FRAMES {
                if self.bit(idx) {
                    run = 0;
                    continue;
                }
                if run == 0 {
                    run_start = idx;
                }
                run += 1;
                if run == count {
                    for i in run_start..run_start + count {
                        self.set_bit(i);
                    }
                    self.allocated.fetch_add(count, Ordering::Relaxed);
                    return Some(run_start);
                }
            }
            None
        })?;

        let paddr = base + start * PAGE_SIZE;
        if zeroed {
            // SAFETY: [paddr, paddr + count*PAGE_SIZE) 位于刚分配出去的帧池区域内
            unsafe { core::ptr::write_bytes(paddr as *mut u8, 0, count * PAGE_SIZE) };
        }
        Some(paddr / PAGE_SIZE)
    }

    /// 释放从 ppn 开始的 count 个帧
    pub fn free_frames(&self, ppn: usize, count: usize) {
        let base = self.pool_base();
        let start = ppn - base / PAGE_SIZE;
        assert!(
            start + count <= POOL_FRAMES,
            "mock free_frames: frame out of pool"
        );
        self.with_scan_lock(|| {
            for idx in start..start + count {
                assert!(self.bit(idx), "mock free_frames: double free detected");
                self.clear_bit(idx);
            }
            self.allocated.fetch_sub(count, Ordering::Relaxed);
        });
    }

    /// 当前已分配的帧数
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// 设置还允许成功的分配次数（usize::MAX 表示不限制）
    pub fn set_fail_after(&self, remaining: usize) {
        self.fail_after.store(remaining, Ordering::Relaxed);
    }
}

impl Default for MockFrameAlloc {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_FRAME_ALLOC: MockFrameAlloc = MockFrameAlloc::new();

// ============================================================================
// MockTlb - 硬件 TLB Mock
// ============================================================================

/// Mock 的硬件 TLB
///
/// 记录随机槽位写入次数、最后一次写入的 (entry_hi, entry_lo)
/// 和整体失效次数；地址转换采用恒等映射。
pub struct MockTlb {
    last_hi: AtomicUsize,
    last_lo: AtomicUsize,
    random_writes: AtomicUsize,
    full_flushes: AtomicUsize,
}

impl MockTlb {
    pub const fn new() -> Self {
        Self {
            last_hi: AtomicUsize::new(0),
            last_lo: AtomicUsize::new(0),
            random_writes: AtomicUsize::new(0),
            full_flushes: AtomicUsize::new(0),
        }
    }

    /// 记录一次随机槽位写入
    pub fn write_random(&self, entry_hi: usize, entry_lo: usize) {
        self.last_hi.store(entry_hi, Ordering::Relaxed);
        self.last_lo.store(entry_lo, Ordering::Relaxed);
        self.random_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次整体失效
    pub fn invalidate_all(&self) {
        self.full_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// 物理地址转虚拟地址（测试默认：恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }

    /// 最后一次写入的 (entry_hi, entry_lo)
    pub fn last_entry(&self) -> (usize, usize) {
        (
            self.last_hi.load(Ordering::Relaxed),
            self.last_lo.load(Ordering::Relaxed),
        )
    }

    /// 随机槽位写入次数
    pub fn random_writes(&self) -> usize {
        self.random_writes.load(Ordering::Relaxed)
    }

    /// 整体失效次数
    pub fn full_flushes(&self) -> usize {
        self.full_flushes.load(Ordering::Relaxed)
    }

    /// 清空全部计数和记录
    pub fn reset(&self) {
        self.last_hi.store(0, Ordering::Relaxed);
        self.last_lo.store(0, Ordering::Relaxed);
        self.random_writes.store(0, Ordering::Relaxed);
        self.full_flushes.store(0, Ordering::Relaxed);
    }
}

impl Default for MockTlb {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_TLB: MockTlb = MockTlb::new();

// ============================================================================
// MockVmConfig - 配置 Mock
// ============================================================================

/// Mock 的虚拟内存配置
pub struct MockVmConfig;

impl MockVmConfig {
    pub const fn new() -> Self {
        Self
    }

    /// 用户地址空间上界（测试默认：2 GiB，MIPS 风格内核/用户分界）
    pub fn user_space_top(&self) -> usize {
        0x8000_0000
    }

    /// 用户栈大小（测试默认：16 页）
    pub fn user_stack_size(&self) -> usize {
        16 * PAGE_SIZE
    }
}

impl Default for MockVmConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_VM_CONFIG: MockVmConfig = MockVmConfig::new();
