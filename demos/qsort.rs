//! Parallel quicksort built from spawned jobs.
//!
//! A single root job partitions the array; after it terminates, its
//! spawning hook hands the manager one child job per half, and those
//! children partition and spawn in turn. Deep in the recursion the jobs
//! stop spawning and sort their range inline, keeping the job count
//! proportional to the worker count rather than to the array size.
//!
//! Run with `cargo run --release --example qsort`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use threadmill::{Job, JobCore, JobManager, ManagerEvent};
use tracing_subscriber::EnvFilter;

const N: usize = 5_000_000;

/// Ranges shorter than this are sorted without further partitioning.
const SMALL_LIMIT: usize = 150;

/// Recursion depth beyond which jobs sort inline instead of spawning.
const SPAWN_DEPTH: u32 = 4;

/// The array under sort, shared by every job.
///
/// Jobs only ever touch the disjoint range they were created for, which
/// is what makes handing out overlapping `&mut` slices sound.
struct SortBuffer(UnsafeCell<Vec<i32>>);

unsafe impl Sync for SortBuffer {}

impl SortBuffer {
    /// Safety: the caller must be the only holder of [lo, hi].
    #[allow(clippy::mut_from_ref)]
    unsafe fn range_mut(&self, lo: usize, hi: usize) -> &mut [i32] {
        let v: &mut Vec<i32> = &mut *self.0.get();
        &mut v[lo..=hi]
    }
}

struct SortJob {
    core: JobCore,
    buffer: Arc<SortBuffer>,
    lo: usize,
    hi: usize,
    depth: u32,
    mid: AtomicUsize,
    spawn: AtomicBool,
    handed_out: AtomicUsize,
}

impl SortJob {
    fn new(buffer: Arc<SortBuffer>, lo: usize, hi: usize, depth: u32) -> Self {
        Self {
            core: JobCore::new(),
            buffer,
            lo,
            hi,
            depth,
            mid: AtomicUsize::new(0),
            spawn: AtomicBool::new(false),
            handed_out: AtomicUsize::new(0),
        }
    }
}

impl Job for SortJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn run(&self) {
        // Safety: this job is the only holder of [lo, hi]; children for
        // the two halves are only handed out after this body returned.
        let slice = unsafe { self.buffer.range_mut(self.lo, self.hi) };
        if slice.len() < SMALL_LIMIT {
            small_sort(slice);
            return;
        }
        let split = divide(slice);
        if self.depth >= SPAWN_DEPTH {
            // Deep enough: finish the range here instead of paying the
            // bookkeeping for ever smaller jobs.
            let (lower, upper) = slice.split_at_mut(split + 1);
            sort_inline(lower);
            sort_inline(upper);
            return;
        }
        self.mid.store(self.lo + split, Ordering::Release);
        self.spawn.store(true, Ordering::Release);
    }

    fn next_spawned_job(&self) -> Option<Box<dyn Job>> {
        if !self.spawn.load(Ordering::Acquire) {
            return None;
        }
        let mid = self.mid.load(Ordering::Acquire);
        match self.handed_out.fetch_add(1, Ordering::AcqRel) {
            0 => Some(Box::new(SortJob::new(
                self.buffer.clone(),
                self.lo,
                mid,
                self.depth + 1,
            ))),
            1 => Some(Box::new(SortJob::new(
                self.buffer.clone(),
                mid + 1,
                self.hi,
                self.depth + 1,
            ))),
            _ => None,
        }
    }
}

/// Partitions the slice around its middle element, returning the last
/// index of the lower half.
fn divide(slice: &mut [i32]) -> usize {
    let pivot = slice[(slice.len() - 1) >> 1];
    let mut l: i64 = 0;
    let mut r: i64 = slice.len() as i64 - 1;
    loop {
        while (l as usize) < slice.len() && slice[l as usize] < pivot {
            l += 1;
        }
        while r >= 0 && slice[r as usize] >= pivot {
            r -= 1;
        }
        if l >= r {
            if r < 0 {
                // The pivot was the minimum; isolate one element so both
                // halves stay strictly smaller.
                slice.swap(0, (slice.len() - 1) >> 1);
                r = 0;
            }
            return r as usize;
        }
        slice.swap(l as usize, r as usize);
        l += 1;
        r -= 1;
    }
}

fn small_sort(slice: &mut [i32]) {
    for i in 0..slice.len() {
        let mut min = i;
        for j in i + 1..slice.len() {
            if slice[j] < slice[min] {
                min = j;
            }
        }
        slice.swap(i, min);
    }
}

fn sort_inline(slice: &mut [i32]) {
    if slice.len() < SMALL_LIMIT {
        small_sort(slice);
        return;
    }
    let split = divide(slice);
    let (lower, upper) = slice.split_at_mut(split + 1);
    sort_inline(lower);
    sort_inline(upper);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut rng = rand::rng();
    let data: Vec<i32> = (0..N)
        .map(|_| rng.random_range(0..10 * N as i32))
        .collect();

    let mut reference = data.clone();
    let started = Instant::now();
    reference.sort_unstable();
    println!("std sort_unstable: {:?}", started.elapsed());

    let buffer = Arc::new(SortBuffer(UnsafeCell::new(data)));
    let manager = JobManager::new(8);
    manager.append_job(SortJob::new(buffer.clone(), 0, N - 1, 1));

    let events = manager.subscribe();
    let started = Instant::now();
    manager.start();
    for event in events.iter() {
        if matches!(
            event,
            ManagerEvent::Completed | ManagerEvent::Stopped | ManagerEvent::Error(_)
        ) {
            break;
        }
    }
    println!(
        "job-based quicksort: {:?} across {} jobs",
        started.elapsed(),
        manager.job_count()
    );

    // Drop the manager's job handles so the buffer can be reclaimed.
    manager.clear();
    let sorted = Arc::try_unwrap(buffer)
        .unwrap_or_else(|_| panic!("sort jobs still hold the buffer"))
        .0
        .into_inner();
    assert_eq!(sorted, reference, "job-based sort produced a different order");
    println!("verified {} elements", sorted.len());
}
