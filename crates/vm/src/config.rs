//! 虚拟内存配置 trait 定义和注册
//!
//! 页大小等页几何常量由二级页表格式固定（见 [`crate::address`]），
//! 不在配置中提供，避免配置与表格式不一致。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 虚拟内存布局配置常量
///
/// 此 trait 提供地址空间布局所需的配置常量。
/// 内核需要实现此 trait 并注册。
pub trait VmConfig: Send + Sync {
    /// 用户地址空间上界（内核/用户分界，不含）
    fn user_space_top(&self) -> usize;

    /// 用户栈大小（页对齐）
    fn user_stack_size(&self) -> usize;
}

static CONFIG_DATA: AtomicUsize = AtomicUsize::new(0);
static CONFIG_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册配置实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_config(config: &'static dyn VmConfig) {
    let ptr = config as *const dyn VmConfig;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn VmConfig, (usize, usize)>(ptr) };
    CONFIG_DATA.store(data, Ordering::Release);
    CONFIG_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的配置实现
///
/// # Panics
/// 如果尚未调用 [`register_config`] 注册实现，则 panic
#[inline]
pub fn vm_config() -> &'static dyn VmConfig {
    let data = CONFIG_DATA.load(Ordering::Acquire);
    let vtable = CONFIG_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("vm: VmConfig not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn VmConfig>((data, vtable)) }
}
