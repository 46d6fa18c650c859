//! Calling generated code whose parameters are all `u32`.

use fj_jit::JitEntry;

/// Widest arity [`call_u32`] can dispatch.
pub const MAX_ARGS: usize = 16;

macro_rules! u32_param {
    ($idx:tt) => {
        u32
    };
}

macro_rules! call_with {
    ($entry:expr, $args:expr; $($idx:tt)*) => {{
        let f: extern "C" fn($(u32_param!($idx)),*) -> u32 = $entry.as_fn();
        f($($args[$idx]),*)
    }};
}

/// Calls `entry` with `args` and returns its `u32` result, or `None` when
/// there are more than [`MAX_ARGS`] arguments.
///
/// # Safety
///
/// `entry` must be a host calling convention function taking exactly
/// `args.len()` 32-bit integers and returning one.
pub unsafe fn call_u32(entry: JitEntry<'_>, args: &[u32]) -> Option<u32> {
    let a = args;
    let ret = match a.len() {
        0 => call_with!(entry, a;),
        1 => call_with!(entry, a; 0),
        2 => call_with!(entry, a; 0 1),
        3 => call_with!(entry, a; 0 1 2),
        4 => call_with!(entry, a; 0 1 2 3),
        5 => call_with!(entry, a; 0 1 2 3 4),
        6 => call_with!(entry, a; 0 1 2 3 4 5),
        7 => call_with!(entry, a; 0 1 2 3 4 5 6),
        8 => call_with!(entry, a; 0 1 2 3 4 5 6 7),
        9 => call_with!(entry, a; 0 1 2 3 4 5 6 7 8),
        10 => call_with!(entry, a; 0 1 2 3 4 5 6 7 8 9),
        11 => call_with!(entry, a; 0 1 2 3 4 5 6 7 8 9 10),
        12 => call_with!(entry, a; 0 1 2 3 4 5 6 7 8 9 10 11),
        13 => call_with!(entry, a; 0 1 2 3 4 5 6 7 8 9 10 11 12),
        14 => call_with!(entry, a; 0 1 2 3 4 5 6 7 8 9 10 11 12 13),
        15 => call_with!(entry, a; 0 1 2 3 4 5 6 7 8 9 10 11 12 13 14),
        16 => call_with!(entry, a; 0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15),
        _ => return None,
    };
    Some(ret)
}
