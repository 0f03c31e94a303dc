use crate::context::{CancelFlag, MAX_THREAD_COUNT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

pub fn determine_thread_count(total: usize, requested: usize) -> usize {
    requested.min(MAX_THREAD_COUNT).min(total).max(1)
}

/// Runs `job` over `items`, split in contiguous chunks across at most
/// `threads` workers. Slot `i` of the returned vector holds the outcome of
/// `items[i]`, or `None` if cancellation stopped the worker before reaching
/// it.
pub fn run_chunked<T, R, F>(items: &[T], threads: usize, cancel: &CancelFlag, job: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let thread_count = determine_thread_count(total, threads);
    if thread_count == 1 {
        let mut slots = Vec::with_capacity(total);
        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                slots.push(None);
                continue;
            }
            slots.push(Some(job(index, item)));
        }
        return slots;
    }

    let slots: Mutex<Vec<Option<R>>> = Mutex::new((0..total).map(|_| None).collect());
    let progress = AtomicUsize::new(0);
    let chunk_size = (total + thread_count - 1) / thread_count;

    thread::scope(|scope| {
        for (chunk_index, chunk) in items.chunks(chunk_size).enumerate() {
            let offset = chunk_index * chunk_size;
            let slots = &slots;
            let progress = &progress;
            let job = &job;

            scope.spawn(move || {
                for (i, item) in chunk.iter().enumerate() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let outcome = job(offset + i, item);
                    if let Ok(mut guard) = slots.lock() {
                        guard[offset + i] = Some(outcome);
                    }
                    let done = progress.fetch_add(1, Ordering::SeqCst) + 1;
                    log::trace!("{}/{} attempts finished", done, total);
                }
            });
        }
    });

    slots.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_count_is_bounded() {
        assert_eq!(determine_thread_count(3, 10), 3);
        assert_eq!(determine_thread_count(100, 50), MAX_THREAD_COUNT);
        assert_eq!(determine_thread_count(5, 0), 1);
    }

    #[test]
    fn outcomes_keep_submission_order() {
        let items: Vec<usize> = (0..37).collect();
        let cancel = CancelFlag::default();
        let out = run_chunked(&items, 4, &cancel, |index, item| {
            assert_eq!(index, *item);
            item * 2
        });
        let values: Vec<usize> = out.into_iter().map(Option::unwrap).collect();
        assert_eq!(values, (0..37).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn cancelled_run_leaves_untried_slots_empty() {
        let items = vec!["a", "b", "c"];
        let cancel = CancelFlag::default();
        let out = run_chunked(&items, 1, &cancel, |index, item| {
            if index == 0 {
                cancel.cancel();
            }
            item.to_string()
        });
        assert_eq!(out, vec![Some("a".to_string()), None, None]);
    }
}
