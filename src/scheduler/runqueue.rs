/*
 * Bitmap Run Queue
 *
 * 64 FIFO buckets, one per priority band, plus a 64-bit status word with bit
 * i set iff bucket i holds at least one task. Finding the best runnable
 * bucket is a single trailing-zeros instruction.
 *
 * Buckets are doubly linked lists threaded through a per-queue link table
 * indexed by the task's arena slot, so insert and remove are O(1) and the
 * queue never allocates. Links remember the full TaskId: removing a handle
 * that is not linked here is reported instead of corrupting a neighbour.
 *
 * CpuRunQueue wraps the queue with the load counters the slice computation
 * reads.
 */

use super::{
    error::{SchedError, SchedResult},
    task::{MAX_TASKS, TaskId},
    types::{QueueStats, RUNQ_BUCKETS},
};

#[derive(Debug, Clone, Copy)]
struct Link {
    id: TaskId,
    bucket: u8,
    prev: Option<u16>,
    next: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    head: Option<u16>,
    tail: Option<u16>,
    len: usize,
}

/// Priority-indexed run queue
pub struct RunQueue {
    status: u64,
    buckets: [Bucket; RUNQ_BUCKETS],
    links: [Option<Link>; MAX_TASKS],
    len: usize,
}

impl RunQueue {
    pub const fn new() -> Self {
        Self {
            status: 0,
            buckets: [Bucket {
                head: None,
                tail: None,
                len: 0,
            }; RUNQ_BUCKETS],
            links: [None; MAX_TASKS],
            len: 0,
        }
    }

    /// Link `tid` into `bucket`, at the head if `at_front`
    pub fn insert(&mut self, tid: TaskId, bucket: usize, at_front: bool) -> SchedResult<()> {
        if bucket >= RUNQ_BUCKETS {
            return Err(SchedError::InvalidBucket(bucket));
        }
        let slot = tid.index();
        if slot >= MAX_TASKS {
            return Err(SchedError::StaleTask(tid));
        }
        if self.links[slot].is_some() {
            return Err(SchedError::AlreadyQueued(tid));
        }

        let idx = slot as u16;
        let b = &mut self.buckets[bucket];
        let mut link = Link {
            id: tid,
            bucket: bucket as u8,
            prev: None,
            next: None,
        };

        if at_front {
            link.next = b.head;
            match b.head {
                Some(old) => set_prev(&mut self.links, old, Some(idx)),
                None => b.tail = Some(idx),
            }
            b.head = Some(idx);
        } else {
            link.prev = b.tail;
            match b.tail {
                Some(old) => set_next(&mut self.links, old, Some(idx)),
                None => b.head = Some(idx),
            }
            b.tail = Some(idx);
        }

        b.len += 1;
        self.links[slot] = Some(link);
        self.status |= 1 << bucket;
        self.len += 1;
        Ok(())
    }

    /// Unlink `tid` and return the bucket it was in
    pub fn remove(&mut self, tid: TaskId) -> SchedResult<usize> {
        self.unlink(tid, None)
    }

    /// Unlink `tid` while a caller is scanning with `cursor`
    ///
    /// If the bucket empties and the cursor points at it, the cursor moves to
    /// the next bucket (wrapping), so the scan never revisits an empty bucket.
    pub fn remove_with_cursor(&mut self, tid: TaskId, cursor: &mut usize) -> SchedResult<usize> {
        self.unlink(tid, Some(cursor))
    }

    fn unlink(&mut self, tid: TaskId, cursor: Option<&mut usize>) -> SchedResult<usize> {
        let slot = tid.index();
        let link = match self.links.get(slot).copied().flatten() {
            Some(link) if link.id == tid => link,
            _ => return Err(SchedError::NotQueued(tid)),
        };

        let bucket = link.bucket as usize;
        match link.prev {
            Some(prev) => set_next(&mut self.links, prev, link.next),
            None => self.buckets[bucket].head = link.next,
        }
        match link.next {
            Some(next) => set_prev(&mut self.links, next, link.prev),
            None => self.buckets[bucket].tail = link.prev,
        }

        self.links[slot] = None;
        self.len -= 1;
        let b = &mut self.buckets[bucket];
        b.len -= 1;

        if b.len == 0 {
            self.status &= !(1 << bucket);
            if let Some(cursor) = cursor {
                if *cursor == bucket {
                    *cursor = (bucket + 1) % RUNQ_BUCKETS;
                }
            }
        }
        Ok(bucket)
    }

    /// Lowest-numbered (best) bucket holding a task
    pub fn highest_priority_nonempty(&self) -> Option<usize> {
        if self.status == 0 {
            None
        } else {
            Some(self.status.trailing_zeros() as usize)
        }
    }

    /// Head of `bucket`
    pub fn first(&self, bucket: usize) -> Option<TaskId> {
        let head = self.buckets.get(bucket)?.head?;
        self.links[head as usize].map(|link| link.id)
    }

    pub fn contains(&self, tid: TaskId) -> bool {
        self.bucket_of(tid).is_some()
    }

    /// Bucket `tid` is linked into
    pub fn bucket_of(&self, tid: TaskId) -> Option<usize> {
        match self.links.get(tid.index()).copied().flatten() {
            Some(link) if link.id == tid => Some(link.bucket as usize),
            _ => None,
        }
    }

    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.buckets.get(bucket).map_or(0, |b| b.len)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bitmap(&self) -> u64 {
        self.status
    }

    /// Tasks of `bucket` in run order
    pub fn iter_bucket(&self, bucket: usize) -> BucketIter<'_> {
        BucketIter {
            queue: self,
            cursor: self.buckets.get(bucket).and_then(|b| b.head),
        }
    }

    /// Verify the bitmap and bucket lengths against the links
    pub fn check_invariants(&self) -> SchedResult<()> {
        let mut total = 0;
        for bucket in 0..RUNQ_BUCKETS {
            let walked = self.iter_bucket(bucket).count();
            let len = self.buckets[bucket].len;
            let bit = self.status & (1 << bucket) != 0;
            if walked != len || bit != (len > 0) {
                return Err(SchedError::BitmapCorrupt(bucket));
            }
            total += len;
        }
        if total != self.len {
            return Err(SchedError::BitmapCorrupt(RUNQ_BUCKETS));
        }
        Ok(())
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn set_next(links: &mut [Option<Link>], idx: u16, next: Option<u16>) {
    if let Some(link) = links[idx as usize].as_mut() {
        link.next = next;
    }
}

fn set_prev(links: &mut [Option<Link>], idx: u16, prev: Option<u16>) {
    if let Some(link) = links[idx as usize].as_mut() {
        link.prev = prev;
    }
}

pub struct BucketIter<'a> {
    queue: &'a RunQueue,
    cursor: Option<u16>,
}

impl Iterator for BucketIter<'_> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let link = self.queue.links[self.cursor? as usize]?;
        self.cursor = link.next;
        Some(link.id)
    }
}

/// One CPU's run queue plus its load accounting
///
/// Load counts every task that is queued or running on this CPU, so while a
/// task runs the buckets hold one task fewer than `runnable_count`.
pub struct CpuRunQueue {
    pub runq: RunQueue,
    runnable_count: usize,
    system_load: usize,
    switch_count: u64,
    prev_switch_count: u64,
}

impl CpuRunQueue {
    pub const fn new() -> Self {
        Self {
            runq: RunQueue::new(),
            runnable_count: 0,
            system_load: 0,
            switch_count: 0,
            prev_switch_count: 0,
        }
    }

    pub fn load_add(&mut self) {
        self.runnable_count += 1;
        self.system_load += 1;
    }

    pub fn load_rem(&mut self) -> SchedResult<()> {
        if self.runnable_count == 0 || self.system_load == 0 {
            return Err(SchedError::LoadUnderflow);
        }
        self.runnable_count -= 1;
        self.system_load -= 1;
        Ok(())
    }

    pub fn runnable_count(&self) -> usize {
        self.runnable_count
    }

    pub fn system_load(&self) -> usize {
        self.system_load
    }

    /// Count a context switch
    pub fn note_switch(&mut self) {
        self.switch_count = self.switch_count.wrapping_add(1);
    }

    /// Roll the churn counters over at a tick
    pub fn roll_switch_counts(&mut self) {
        self.prev_switch_count = self.switch_count;
        self.switch_count = self.runnable_count as u64;
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            runnable_count: self.runnable_count,
            system_load: self.system_load,
            switch_count: self.switch_count,
            prev_switch_count: self.prev_switch_count,
            bitmap: self.runq.bitmap(),
            queued: self.runq.len(),
        }
    }
}

impl Default for CpuRunQueue {
    fn default() -> Self {
        Self::new()
    }
}
