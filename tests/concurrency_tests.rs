//! # Concurrency Tests using Loom
//!
//! Loom models of the cancellation-token protocol behind fail-fast: a failing
//! worker cancels the shared token, and workers that have not started yet
//! observe the cancellation and count themselves cancelled instead of
//! executing. The orchestrator's own fail-fast path is exercised end to end by
//! `test_fail_fast_cancels_remaining_runs` in the execution integration tests.

#[cfg(test)]
mod tests {
    use loom::sync::Arc;
    use loom::sync::atomic::{AtomicUsize, Ordering};
    use loom::thread;
    use tokio_util::sync::CancellationToken;

    /// Every worker ends up either executed or cancelled, never both and never
    /// neither, and the failing worker always leaves the token cancelled.
    #[test]
    fn test_token_protocol_every_worker_reaches_one_terminal_outcome() {
        // loom explores deep interleavings; give the model a larger stack.
        const STACK_SIZE: usize = 8 * 1024 * 1024;

        let handle = std::thread::Builder::new()
            .name("loom-token-protocol".into())
            .stack_size(STACK_SIZE)
            .spawn(|| {
                loom::model(|| {
                    const RUNS: usize = 2;
                    let executed = Arc::new(AtomicUsize::new(0));
                    let cancelled = Arc::new(AtomicUsize::new(0));
                    let token = Arc::new(CancellationToken::new());

                    let handles: Vec<_> = (0..RUNS)
                        .map(|index| {
                            let token = token.clone();
                            let executed = executed.clone();
                            let cancelled = cancelled.clone();
                            thread::spawn(move || {
                                if token.is_cancelled() {
                                    cancelled.fetch_add(1, Ordering::SeqCst);
                                    return;
                                }
                                executed.fetch_add(1, Ordering::SeqCst);
                                // Worker 0 fails and cancels the token.
                                if index == 0 {
                                    token.cancel();
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }

                    let executed = executed.load(Ordering::SeqCst);
                    let cancelled = cancelled.load(Ordering::SeqCst);
                    assert_eq!(executed + cancelled, RUNS);
                    // Only the failing worker cancels, so it always executes.
                    assert!(token.is_cancelled());
                    assert!(executed >= 1, "executed {executed}, cancelled {cancelled}");
                });
            })
            .unwrap();

        handle.join().unwrap();
    }

    /// A child token observes its parent's cancellation, which is how an
    /// interrupt reaches runs through the fail-fast token.
    #[test]
    fn test_interrupt_reaches_child_token() {
        loom::model(|| {
            let parent = CancellationToken::new();
            let child = parent.child_token();
            let trigger = parent.clone();

            let handle = thread::spawn(move || trigger.cancel());
            handle.join().unwrap();

            assert!(child.is_cancelled());
        });
    }
}
