//! 错误类型定义

/// 虚拟内存操作中可能发生的错误
///
/// 所有错误都由检测到它的操作同步返回，子系统内部不做重试；
/// 由陷入分发器决定信号投递或终止线程。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 物理帧或控制结构分配失败
    OutOfMemory,
    /// 地址越界、未映射，或出现了不应出现的只读异常
    InvalidAddress,
    /// 新区域与已有区域重叠
    RegionConflict,
    /// 无法识别的异常类别
    BadFaultKind,
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;
