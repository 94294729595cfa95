use std::slice::Chunks;
use std::thread;


/// Split `slice` into at most `num_slices` contiguous chunks of near equal size.
pub fn partition<'a, T>(slice: &'a [T], num_slices: usize) -> Chunks<'a, T> {
    let num_slices = num_slices.max(1);
    slice.chunks(((slice.len() + num_slices - 1) / num_slices).max(1))
}

pub fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
