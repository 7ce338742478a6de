use anyhow::Result;
use mtask::{ActionBuilder, Affinity, Builder, Descriptor, StartOptions, Status, Timeout};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const SUM_JOB: u32 = 3;

#[test]
fn test_wide_group_on_all_workers() -> Result<()> {
    let rt = Builder::new().worker_threads(4).try_build()?;
    let runs = Arc::new(AtomicU64::new(0));

    let counter = Arc::clone(&runs);
    rt.register(ActionBuilder::new(SUM_JOB, move |_ctx, _args, _result| {
        counter.fetch_add(1, Ordering::SeqCst);
    }))?;

    // Every member sits in all four ready queues and must run exactly once.
    let group = rt.group()?;
    let tasks = (0..100)
        .map(|_| group.start(&rt.job(SUM_JOB), &[], 0))
        .collect::<mtask::Result<Vec<_>>>()?;
    assert!(tasks.iter().all(|t| t.descriptor() == Descriptor::new()));

    group.wait_all(Timeout::Infinite)?;

    assert!(tasks.iter().all(|t| t.status() == Status::Completed));
    assert_eq!(runs.load(Ordering::SeqCst), 100);
    assert_eq!(rt.live_tasks(), 0);
    Ok(())
}

#[test]
fn test_pinned_members_mixed_priorities() -> Result<()> {
    let rt = Builder::new().worker_threads(4).try_build()?;
    let total = Arc::new(AtomicU64::new(0));

    let sum = Arc::clone(&total);
    rt.register(
        ActionBuilder::new(SUM_JOB, move |_ctx, args, _result| {
            let mut n = [0; 8];
            n.copy_from_slice(args);
            sum.fetch_add(u64::from_le_bytes(n), Ordering::SeqCst);
        })
        .arg_size(8),
    )?;

    let group = rt.group()?;
    let tasks = (0..100u64)
        .map(|i| {
            let worker = i as usize % rt.num_workers();
            let opts = StartOptions::new()
                .correlation(i)
                .descriptor(
                    Descriptor::new()
                        .affinity(Affinity::worker(worker))
                        .priority((i % 4) as u8),
                );
            group.start_with(&rt.job(SUM_JOB), &i.to_le_bytes(), 0, opts)
        })
        .collect::<mtask::Result<Vec<_>>>()?;

    group.wait_all(Timeout::Infinite)?;

    assert!(tasks.iter().all(|t| t.status() == Status::Completed));
    assert_eq!(total.load(Ordering::SeqCst), (0..100).sum::<u64>());
    assert_eq!(group.pending(), 0);
    assert_eq!(rt.live_tasks(), 0);
    Ok(())
}

#[test]
fn test_groups_nest_inside_tasks() -> Result<()> {
    let rt = Builder::new().worker_threads(2).try_build()?;

    let outer = rt.group()?;
    for _ in 0..4 {
        outer.spawn(
            |ctx| {
                let inner = ctx.handle().group().map_err(|_| mtask::Fault::Error(1))?;
                for _ in 0..8 {
                    inner
                        .spawn(|_ctx| {}, Descriptor::new())
                        .map_err(|_| mtask::Fault::Error(2))?;
                }
                inner
                    .wait_all(Timeout::Infinite)
                    .map_err(|_| mtask::Fault::Error(3))
            },
            Descriptor::new(),
        )?;
    }

    outer.wait_all(Timeout::Infinite)?;
    assert_eq!(rt.live_tasks(), 0);
    Ok(())
}
