//! Smith-Waterman local alignment computed tile by tile. Tiles on the same
//! anti-diagonal are independent and run as one group.
use anyhow::Result;
use mtask::{ActionBuilder, Builder, Error, Fault, StartOptions, TaskContext, Timeout};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

const TILE_JOB: u32 = 7;
const MATCH: i32 = 2;
const MISMATCH: i32 = -1;
const GAP: i32 = 1;

struct Matrix {
    a: Vec<u8>,
    b: Vec<u8>,
    tile: usize,
    // (a.len() + 1) x (b.len() + 1), row major, first row and column zero.
    h: Vec<AtomicI32>,
}

impl Matrix {
    fn new(a: &[u8], b: &[u8], tile: usize) -> Self {
        let cells = (a.len() + 1) * (b.len() + 1);
        Self {
            a: a.to_vec(),
            b: b.to_vec(),
            tile,
            h: (0..cells).map(|_| AtomicI32::new(0)).collect(),
        }
    }

    fn cols(&self) -> usize {
        self.b.len() + 1
    }

    fn get(&self, i: usize, j: usize) -> i32 {
        self.h[i * self.cols() + j].load(Ordering::Acquire)
    }

    fn set(&self, i: usize, j: usize, v: i32) {
        self.h[i * self.cols() + j].store(v, Ordering::Release);
    }

    fn tiles(&self) -> (usize, usize) {
        (self.a.len().div_ceil(self.tile), self.b.len().div_ceil(self.tile))
    }

    fn fill_tile(&self, ti: usize, tj: usize) {
        let rows = ti * self.tile + 1..=((ti + 1) * self.tile).min(self.a.len());
        for i in rows {
            let cols = tj * self.tile + 1..=((tj + 1) * self.tile).min(self.b.len());
            for j in cols {
                let s = if self.a[i - 1] == self.b[j - 1] { MATCH } else { MISMATCH };
                let v = (self.get(i - 1, j - 1) + s)
                    .max(self.get(i - 1, j) - GAP)
                    .max(self.get(i, j - 1) - GAP)
                    .max(0);
                self.set(i, j, v);
            }
        }
    }

    fn best(&self) -> i32 {
        self.h.iter().map(|c| c.load(Ordering::Acquire)).max().unwrap_or(0)
    }
}

fn sequential(a: &[u8], b: &[u8]) -> i32 {
    let m = Matrix::new(a, b, a.len().max(b.len()).max(1));
    m.fill_tile(0, 0);
    m.best()
}

fn tile_body(ctx: &TaskContext<'_>, args: &[u8], _result: &mut [u8]) -> std::result::Result<(), Fault> {
    let matrix = ctx.node_local::<Arc<Matrix>>().ok_or(Fault::Error(1))?;
    let (ti, tj) = args.split_at(4);
    let ti = u32::from_le_bytes(ti.try_into().map_err(|_| Fault::Error(2))?);
    let tj = u32::from_le_bytes(tj.try_into().map_err(|_| Fault::Error(2))?);

    matrix.fill_tile(ti as usize, tj as usize);
    Ok(())
}

fn encode(ti: usize, tj: usize) -> [u8; 8] {
    let mut buf = [0; 8];
    buf[..4].copy_from_slice(&(ti as u32).to_le_bytes());
    buf[4..].copy_from_slice(&(tj as u32).to_le_bytes());
    buf
}

#[test]
fn test_wavefront_matches_sequential() -> Result<()> {
    let a = b"GGTTGACTAGCTTAGGACCATGACGTACCTAGGTCAACTTGGAAC".repeat(2);
    let b = b"TGTTACGGATCCTAGGACTTAGCATGCAAGTCCATTGACAGGTA".repeat(2);
    let expected = sequential(&a, &b);

    let matrix = Arc::new(Matrix::new(&a, &b, 8));

    let rt = Builder::new().worker_threads(4).try_build()?;
    let action = rt.register(
        ActionBuilder::new(TILE_JOB, tile_body)
            .arg_size(8)
            .result_size(0)
            .node_local(Arc::clone(&matrix)),
    )?;
    let job = rt.job(TILE_JOB);

    let (rows, cols) = (a.len().div_ceil(8), b.len().div_ceil(8));
    for d in 0..rows + cols - 1 {
        let mut group = rt.group()?;
        let mut started = HashSet::new();

        for ti in d.saturating_sub(cols - 1)..=d.min(rows - 1) {
            let tj = d - ti;
            let correlation = (ti * cols + tj) as u64;
            group.start_with(
                &job,
                &encode(ti, tj),
                0,
                StartOptions::new().correlation(correlation),
            )?;
            started.insert(correlation);
        }

        loop {
            match group.wait_any(Timeout::Infinite) {
                Ok(done) => {
                    done.outcome()?;
                    let correlation = done.correlation_id().unwrap_or(u64::MAX);
                    assert!(started.remove(&correlation), "unexpected completion {correlation}");
                }
                Err(Error::GroupCompleted) => break,
                Err(e) => return Err(e.into()),
            }
        }

        assert!(started.is_empty());
        group.release()?;
    }

    assert_eq!(matrix.tiles(), (rows, cols));
    assert_eq!(matrix.best(), expected);
    assert_eq!(action.live_tasks(), 0);

    rt.unregister(&action)?;
    Ok(())
}
