use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use irradiant_core::{DoseMatrix, Lut, LutSettings, PrintParams, ScanGeometry, extract_frames};
use irradiant_traits::AxisDirection;

// Deterministic dose pattern with empty bands so line filtering has work to do
fn synth_matrix(rows: usize, cols: usize, layers: usize, seed: u32) -> DoseMatrix {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    let mut data = Vec::with_capacity(rows * cols * layers);
    for r in 0..rows {
        for _c in 0..cols {
            for _l in 0..layers {
                data.push(if r % 4 == 0 { 0.0 } else { next() });
            }
        }
    }
    DoseMatrix::new([rows, cols, layers], data).unwrap()
}

fn lut() -> Lut {
    let points: Vec<(f64, f64)> = (0..=20)
        .map(|i| {
            let p = f64::from(i) / 20.0;
            (p, p.powf(0.7))
        })
        .collect();
    Lut::new(&points, LutSettings::default()).unwrap()
}

pub fn bench_signals(c: &mut Criterion) {
    let mut g = c.benchmark_group("signals");
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p irradiant_core --bench signals
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(30);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let lut = lut();
    let m = synth_matrix(128, 128, 8, 0xC0FFEE);

    g.bench_function("lut_convert_128x128x8", |b| {
        b.iter(|| black_box(lut.convert_all(black_box(m.as_slice()))))
    });

    g.bench_function("extract_frames_128x128x8", |b| {
        b.iter_batched(
            || m.clone(),
            |m| {
                let set = extract_frames(
                    &m,
                    &lut,
                    &ScanGeometry::default(),
                    &PrintParams::default(),
                    AxisDirection::Negative,
                )
                .unwrap();
                for plan in &set.layers {
                    black_box(set.build_frame(plan, &m, &lut).len());
                }
            },
            BatchSize::LargeInput,
        )
    });
    g.finish();
}

criterion_group!(signals, bench_signals);
criterion_main!(signals);
