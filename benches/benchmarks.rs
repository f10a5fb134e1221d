//! Performance benchmarks for Changeflow.
//!
//! This module contains benchmarks for:
//! - Impact prioritization over large request lists
//! - SLA computation
//! - Stream decoding of chunked generation output
//!
//! Run with: `cargo bench`

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use changeflow::ai::StreamDecoder;
use changeflow::workflow::{
    calculate_sla, sort_by_impact_score, Complexity, ImpactAssessment, Priority, Request,
    ScoreBreakdown,
};

// ============================================================================
// Mock Data Fixtures
// ============================================================================

mod fixtures {
    use super::*;

    /// Requests with a mix of scores, complexities and unassessed entries.
    pub fn generate_requests(count: usize) -> Vec<Request> {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let complexities = [Complexity::Simple, Complexity::Medium, Complexity::Complex];

        (0..count)
            .map(|i| {
                let created = base + Duration::days((i % 30) as i64);
                let mut request =
                    Request::new(format!("Request {i}"), "bench", Priority::Medium, created)
                        .with_complexity(complexities[i % 3]);

                if i % 4 != 0 {
                    let revenue = (i * 7 % 31) as f64;
                    let breakdown = ScoreBreakdown::new(revenue, 20.0, 10.0, 5.0, 5.0);
                    request.impact_assessment = Some(ImpactAssessment::manual_override(
                        breakdown, "Bench", "bench", created,
                    ));
                }
                request
            })
            .collect()
    }

    /// A streamed body of `frames` text fragments forming one JSON array.
    pub fn generate_stream(frames: usize) -> String {
        let mut body = String::from("data: {\"delta\":\"[\"}\n");
        for i in 0..frames {
            let sep = if i + 1 == frames { "" } else { "," };
            body.push_str(&format!(
                "event: content_block_delta\ndata: {{\"delta\":{{\"text\":\"{i}{sep}\"}}}}\n"
            ));
        }
        body.push_str("data: {\"delta\":\"]\"}\ndata: [DONE]\n");
        body
    }
}

// ============================================================================
// Prioritization Benchmarks
// ============================================================================

fn bench_sort_by_impact(c: &mut Criterion) {
    let mut group = c.benchmark_group("impact/sort");

    for count in [100, 1000, 5000].iter() {
        let requests = fixtures::generate_requests(*count);
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("requests", count), &requests, |b, requests| {
            b.iter(|| black_box(sort_by_impact_score(black_box(requests))));
        });
    }

    group.finish();
}

fn bench_sla(c: &mut Criterion) {
    let requests = fixtures::generate_requests(1000);
    let now = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap();

    c.bench_function("sla/calculate_1000", |b| {
        b.iter(|| {
            for request in &requests {
                black_box(calculate_sla(black_box(request), now));
            }
        });
    });
}

// ============================================================================
// Stream Decoding Benchmarks
// ============================================================================

fn bench_stream_decoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream/decode");

    for frames in [100, 1000, 10_000].iter() {
        let body = fixtures::generate_stream(*frames);
        group.throughput(Throughput::Bytes(body.len() as u64));

        // Small chunks force lines to be carried across chunk boundaries
        for chunk_size in [64, 4096] {
            group.bench_with_input(
                BenchmarkId::new(format!("chunk_{chunk_size}"), frames),
                &body,
                |b, body| {
                    b.iter(|| {
                        let mut decoder = StreamDecoder::new(5);
                        for chunk in body.as_bytes().chunks(chunk_size) {
                            decoder.push(black_box(chunk)).unwrap();
                        }
                        black_box(decoder.finish().unwrap())
                    });
                },
            );
        }
    }

    group.finish();
}

// ============================================================================
// Criterion Groups and Main
// ============================================================================

criterion_group!(impact_benches, bench_sort_by_impact, bench_sla,);

criterion_group!(stream_benches, bench_stream_decoder,);

criterion_main!(impact_benches, stream_benches,);
