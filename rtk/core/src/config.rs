//! Compile-time kernel configuration

/// Maximum number of live threads
pub const MAX_THREADS: usize = 32;

/// Number of scheduler priority levels; must fit in one bitmap word
pub const PRIORITY_LEVELS: usize = 16;

/// Priority of the idle thread (least urgent level)
pub const PRIORITY_IDLE: u8 = (PRIORITY_LEVELS - 1) as u8;

/// Default priority of the main thread
pub const PRIORITY_MAIN: u8 = PRIORITY_IDLE - (PRIORITY_LEVELS / 2) as u8;

/// Default stack size in bytes
pub const STACKSIZE_DEFAULT: usize = 1024;

/// Stack size of the idle thread
pub const STACKSIZE_IDLE: usize = 256;

/// Stack size of the main thread
pub const STACKSIZE_MAIN: usize = STACKSIZE_DEFAULT + 512;

/// Size of one stack word
pub const WORD_SIZE: usize = core::mem::size_of::<usize>();

const _: () = assert!(PRIORITY_LEVELS <= usize::BITS as usize);
const _: () = assert!(MAX_THREADS < u8::MAX as usize);
