//! Ports - テストで差し替える部分の抽象化
//!
//! - **HandleAllocator**: command handle の発行元
//! - **Clock**: 登録時刻

pub mod clock;
pub mod handle_allocator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::handle_allocator::{HandleAllocator, SequentialAllocator};
