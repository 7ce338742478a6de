//! Recursive task tree: every task starts its two sub-problems and waits on
//! them from inside its own body.
use anyhow::Result;
use mtask::{ActionBuilder, Builder, Fault, Handle, TaskContext, Timeout};
use rstest::rstest;

const FIB_JOB: u32 = 42;

fn decode(buf: &[u8]) -> std::result::Result<i32, Fault> {
    buf.try_into()
        .map(i32::from_le_bytes)
        .map_err(|_| Fault::Error(1))
}

fn fib_child(handle: &Handle, n: i32) -> std::result::Result<mtask::Task, Fault> {
    handle
        .start(&handle.job(FIB_JOB), &n.to_le_bytes(), 4)
        .map_err(|_| Fault::Error(2))
}

fn fib_body(ctx: &TaskContext<'_>, args: &[u8], result: &mut [u8]) -> std::result::Result<(), Fault> {
    let n = decode(args)?;
    if n < 2 {
        result.copy_from_slice(&n.to_le_bytes());
        return Ok(());
    }

    let left = fib_child(ctx.handle(), n - 1)?;
    let right = fib_child(ctx.handle(), n - 2)?;

    let mut sum = 0;
    for task in [left, right] {
        let value = task.join().map_err(|_| Fault::Error(3))?;
        sum += decode(&value)?;
    }

    result.copy_from_slice(&sum.to_le_bytes());
    Ok(())
}

fn fib(n: i32) -> i32 {
    (0..n).fold((0, 1), |(a, b), _| (b, a + b)).0
}

#[rstest]
#[case::one_worker(1, 5)]
#[case::two_workers(2, 5)]
#[case::four_workers(4, 12)]
#[case::base(2, 1)]
fn test_fibonacci(#[case] workers: usize, #[case] n: i32) -> Result<()> {
    let rt = Builder::new().worker_threads(workers).try_build()?;
    rt.register(ActionBuilder::new(FIB_JOB, fib_body).arg_size(4).result_size(4))?;

    let task = rt.start(&rt.job(FIB_JOB), &n.to_le_bytes(), 4)?;
    task.wait(Timeout::Infinite)?;

    let value = task.take_result().map(|buf| decode(&buf));
    assert_eq!(value, Some(Ok(fib(n))));
    assert_eq!(rt.live_tasks(), 0);

    rt.shutdown();
    Ok(())
}
