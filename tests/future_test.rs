#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use promise_future::{
        failure, future, sequence, sequence_in, success, Error, Executor, Future, Immediate,
        PoolConfig, Promise, ThreadPoolExecutor,
    };
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Barrier, Once};
    use std::{thread, time::Duration};

    static INIT_LOGGING: Once = Once::new();

    fn init_test_logging() {
        INIT_LOGGING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_test_writer()
                .with_thread_names(true)
                .try_init();
        });
    }

    fn delayed<T, E>(millis: u64, result: Result<T, E>) -> Future<T, E>
    where
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        future(move || {
            thread::sleep(Duration::from_millis(millis));
            result
        })
    }

    #[test]
    fn test_spawned_producer_result() {
        init_test_logging();
        let fut = future(|| success::<i32, String>(42));
        assert_eq!(fut.result(), Ok(42));
        assert!(fut.is_completed());
    }

    #[test]
    fn test_concurrent_double_complete_keeps_one_value() {
        init_test_logging();
        for _ in 0..20 {
            let (promise, fut) = Promise::<usize, ()>::new();
            let barrier = Arc::new(Barrier::new(2));
            let racers: Vec<_> = (0..2)
                .map(|i| {
                    let promise = promise.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        catch_unwind(AssertUnwindSafe(|| promise.complete(Ok(i)))).is_ok()
                    })
                })
                .collect();
            let wins: Vec<bool> = racers
                .into_iter()
                .map(|t| t.join().expect("The racer thread has panicked"))
                .collect();
            assert_eq!(wins.iter().filter(|won| **won).count(), 1);
            let winner = wins.iter().position(|won| *won).unwrap();
            assert_eq!(fut.result(), Ok(winner));
            assert_eq!(fut.result(), Ok(winner));
        }
    }

    #[test]
    fn test_completion_visible_on_every_thread() {
        init_test_logging();
        let (promise, fut) = Promise::<String, ()>::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let fut = fut.clone();
                thread::spawn(move || fut.result())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        promise.complete(Ok("done".into()));
        for waiter in waiters {
            assert_eq!(
                waiter.join().expect("The waiter thread has panicked"),
                Ok("done".into())
            );
        }
        let fut2 = fut.clone();
        let checker = thread::spawn(move || fut2.is_completed());
        assert!(checker.join().expect("The checker thread has panicked"));
    }

    #[test]
    fn test_callback_fires_once_before_and_after() {
        init_test_logging();
        let (promise, fut) = Promise::<i32, ()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = channel();
        {
            let calls = calls.clone();
            let tx = tx.clone();
            let observed = fut.clone();
            fut.on_complete(move |r| {
                assert!(observed.is_completed());
                calls.fetch_add(1, Ordering::SeqCst);
                tx.send(r).unwrap();
            });
        }
        promise.complete(Ok(11));
        {
            let calls = calls.clone();
            fut.on_complete(move |r| {
                calls.fetch_add(1, Ordering::SeqCst);
                tx.send(r).unwrap();
            });
        }
        for _ in 0..2 {
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(Ok(11)));
        }
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registration_races_completion() {
        init_test_logging();
        const THREADS: usize = 4;
        const PER_THREAD: usize = 10;
        for round in 0..500 {
            let (promise, fut) = Promise::<usize, ()>::new_in(Arc::new(Immediate));
            let hits = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(Barrier::new(THREADS + 1));
            let registrars: Vec<_> = (0..THREADS)
                .map(|_| {
                    let fut = fut.clone();
                    let hits = hits.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        for _ in 0..PER_THREAD {
                            let hits = hits.clone();
                            fut.on_complete(move |r| {
                                assert_eq!(r, Ok(round));
                                hits.fetch_add(1, Ordering::SeqCst);
                            });
                        }
                    })
                })
                .collect();
            barrier.wait();
            promise.complete(Ok(round));
            for registrar in registrars {
                registrar.join().expect("The registrar thread has panicked");
            }
            assert_eq!(hits.load(Ordering::SeqCst), THREADS * PER_THREAD);
            assert_eq!(fut.result(), Ok(round));
        }
    }

    #[test]
    fn test_map_identity_and_composition() {
        init_test_logging();
        let base = delayed::<i32, ()>(10, Ok(4));
        assert_eq!(base.map(|v| v).result(), base.result());

        let f = |v: i32| v + 1;
        let g = |v: i32| v * 10;
        let chained = base.map(f).map(g);
        let composed = base.map(move |v| g(f(v)));
        assert_eq!(chained.result(), composed.result());
        assert_eq!(chained.result(), Ok(50));
    }

    #[test]
    fn test_failure_skips_transforms() {
        init_test_logging();
        let called = Arc::new(AtomicUsize::new(0));
        let parent = delayed::<i32, String>(10, Err("E".into()));

        let c = called.clone();
        let mapped = parent.map(move |v| {
            c.fetch_add(1, Ordering::SeqCst);
            v
        });
        let c = called.clone();
        let flat = parent.flat_map(move |v| {
            c.fetch_add(1, Ordering::SeqCst);
            Future::completed(Ok(v))
        });
        let c = called.clone();
        let chained = parent.and_then(move |v| {
            c.fetch_add(1, Ordering::SeqCst);
            Future::completed(Ok(v))
        });

        assert_eq!(mapped.result(), Err("E".into()));
        assert_eq!(flat.result(), Err("E".into()));
        assert_eq!(chained.result(), Err("E".into()));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_flat_map_forwards_dependent_result() {
        init_test_logging();
        let parent = delayed::<i32, String>(5, Ok(2));
        let ok = parent.flat_map(|v| delayed(10, Ok(v * 3)));
        let err = parent.flat_map(|_| delayed::<i32, String>(10, Err("inner".into())));
        assert_eq!(ok.result(), Ok(6));
        assert_eq!(err.result(), Err("inner".into()));

        let chained = parent.and_then(|v| delayed(10, Ok(v + 1)));
        assert_eq!(chained.result(), Ok(3));
    }

    #[test]
    fn test_and_then_on_single_worker_pool() {
        init_test_logging();
        let pool: Arc<dyn Executor> =
            Arc::new(ThreadPoolExecutor::new(PoolConfig::new().pool_size(1)).unwrap());
        let (inner_promise, inner) = Promise::<i32, ()>::new_in(pool.clone());
        let parent = Future::<i32, ()>::completed_in(Ok(1), pool.clone());
        let chained = parent.and_then(move |v| inner.map(move |w| v + w));
        thread::sleep(Duration::from_millis(20));
        inner_promise.complete(Ok(41));
        assert_eq!(chained.wait_result(Duration::from_secs(5)), Some(Ok(42)));
    }

    #[test]
    fn test_sequence_success_in_input_order() {
        init_test_logging();
        let futures = vec![
            delayed::<i32, String>(30, Ok(1)),
            delayed(10, Ok(2)),
            delayed(20, Ok(3)),
        ];
        assert_eq!(sequence(futures).result(), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_sequence_first_failure_in_input_order() {
        init_test_logging();
        let futures = vec![
            delayed::<i32, String>(10, Ok(1)),
            delayed(40, Err("E1".into())),
            delayed(1, Err("E2".into())),
        ];
        assert_eq!(sequence(futures).result(), Err("E1".into()));
    }

    #[test]
    fn test_sequence_on_pool() {
        init_test_logging();
        let pool: Arc<dyn Executor> =
            Arc::new(ThreadPoolExecutor::new(PoolConfig::new().pool_size(2)).unwrap());
        let (p1, f1) = Promise::<i32, ()>::new_in(pool.clone());
        let (p2, f2) = Promise::<i32, ()>::new_in(pool.clone());
        let all = sequence_in(vec![f1, f2], pool);
        p2.complete(Ok(2));
        assert_eq!(all.wait_result(Duration::from_millis(20)), None);
        p1.complete(Ok(1));
        assert_eq!(all.wait_result(Duration::from_secs(5)), Some(Ok(vec![1, 2])));
    }

    #[test]
    fn test_timed_out_wait_is_harmless() {
        init_test_logging();
        let (promise, fut) = Promise::<i32, ()>::new();
        assert_eq!(fut.wait_result(Duration::from_millis(10)), None);
        assert!(!fut.is_completed());
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.complete(Ok(8));
        });
        assert_eq!(fut.result(), Ok(8));
        producer.join().expect("The producer thread has panicked");
    }

    #[test]
    fn test_panicking_producer_abandons() {
        init_test_logging();
        let fut = future(|| -> Result<i32, ()> { panic!("producer failed") });
        assert!(matches!(fut.try_result(), Err(Error::ProducerDropped)));
        assert!(!fut.is_completed());
        assert!(matches!(block_on(fut.map(|v| v + 1)), Err(Error::ProducerDropped)));
    }

    #[test]
    fn test_await_on_another_thread() {
        init_test_logging();
        let (op, op_a) = Promise::<String, String>::new();
        let task1 = thread::spawn(move || block_on(async { op_a.await }));
        let task2 = thread::spawn(move || op.complete(failure(String::from("reject!!"))));
        task2.join().expect("The task2 thread has panicked");
        assert_eq!(
            task1.join().expect("The task1 thread has panicked").unwrap(),
            Err(String::from("reject!!"))
        );
    }

    #[test]
    fn test_immediate_executor_runs_callbacks_on_completer() {
        init_test_logging();
        let (promise, fut) = Promise::<i32, ()>::new_in(Arc::new(Immediate));
        let (tx, rx) = channel();
        fut.on_success(move |v| tx.send((v, thread::current().id())).unwrap());
        let completer = thread::spawn(move || {
            promise.complete(Ok(1));
            thread::current().id()
        });
        let completer_id = completer.join().expect("The completer thread has panicked");
        assert_eq!(rx.try_recv(), Ok((1, completer_id)));
    }
}
