//! Criterion benchmarks for the record hot paths.
//!
//! Key metrics:
//! - Stage chain throughput (samples/sec) for different record sizes
//! - Writer throughput for EDF and BDF encodings
//!
//! Run with: cargo bench --bench record_pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use edf_daq::filters::{FilterSpec, IirFilterType};
use edf_daq::{
    EdfResult, EdfWriter, FileType, PipelineBuilder, RecordConfig, RecordStream, SignalDescriptor,
    SyntheticSource, WriterOptions,
};

/// Discards everything it receives.
struct NullSink;

impl RecordStream for NullSink {
    fn configure(&mut self, _config: &RecordConfig) -> EdfResult<()> {
        Ok(())
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        black_box(record);
        Ok(())
    }

    fn close(&mut self) -> EdfResult<()> {
        Ok(())
    }
}

fn config(signals: usize, samples: usize, file_type: FileType) -> RecordConfig {
    let (low, high) = file_type.digital_limits();
    let signals = (0..signals)
        .map(|i| SignalDescriptor::new(format!("ch{i}"), samples, (low, high), (-1000.0, 1000.0)))
        .collect();
    RecordConfig::new(0.25, signals).unwrap()
}

/// Full chain: join to one second, one filter and one divider per signal, drop the last signal.
fn pipeline_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_write");

    let shapes = vec![("8x32", 8, 32), ("16x64", 16, 64), ("32x128", 32, 128)];

    for (name, signals, samples) in shapes {
        let input = config(signals, samples, FileType::Edf);
        let mut builder = PipelineBuilder::new().join_duration(1.0);
        for signal in 0..signals {
            builder = builder
                .filter(FilterSpec::Iir {
                    signal,
                    filter_type: IirFilterType::Lowpass,
                    cutoff_hz: 30.0,
                    q: None,
                })
                .filter(FilterSpec::MovingAverage { signal, window: 4 })
                .divider(signal, 2);
        }
        let mut pipeline = builder
            .remove_signal(signals - 1)
            .build(&input, Box::new(NullSink))
            .unwrap();
        let record = SyntheticSource::new(input.clone()).unwrap().generate_record();

        group.throughput(Throughput::Elements(record.len() as u64));
        group.bench_with_input(BenchmarkId::new("write", name), &record, |b, record| {
            b.iter(|| pipeline.write(black_box(record)).unwrap());
        });
    }

    group.finish();
}

/// Sample encoding and file append for both formats.
fn writer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_write");

    for file_type in [FileType::Edf, FileType::Bdf] {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(format!("bench.{file_type}"));
        let input = config(16, 256, file_type);
        let mut writer = EdfWriter::new(&path, WriterOptions::new(file_type));
        writer.configure(&input).unwrap();
        let record = SyntheticSource::new(input.clone()).unwrap().generate_record();

        group.throughput(Throughput::Bytes(
            (record.len() * file_type.bytes_per_sample()) as u64,
        ));
        group.bench_with_input(
            BenchmarkId::new("record", file_type.to_string()),
            &record,
            |b, record| {
                b.iter(|| writer.write(black_box(record)).unwrap());
            },
        );
        writer.close().unwrap();
    }

    group.finish();
}

criterion_group!(benches, pipeline_throughput, writer_throughput);
criterion_main!(benches);
