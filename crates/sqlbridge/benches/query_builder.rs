use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sqlbridge::{BridgeResult, Driver, Executor, Op, QueryBuilder, ResultSet, Value};
use std::sync::Arc;

struct Noop;

impl Executor for Noop {
    fn driver(&self) -> Driver {
        Driver::MySql
    }

    async fn query(&self, _: &str, _: &[Value]) -> BridgeResult<Arc<ResultSet>> {
        Ok(Arc::new(ResultSet::default()))
    }
}

/// SELECT * FROM `t` WHERE col0=? AND col1=? ...
fn build_select(db: &Noop, n: usize) -> QueryBuilder<'_, Noop> {
    let mut q = db.builder().select(&[]).from("t");
    for i in 0..n {
        let field = format!("col{i}");
        q = if i == 0 {
            q.where_(&field, Op::Eq, i as i64)
        } else {
            q.and(&field, Op::Eq, i as i64)
        };
    }
    q
}

fn bench_build_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_builder/select_where");
    let db = Noop;

    for n in [1, 5, 10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build_select(&db, n).query_text().len()));
        });
    }

    group.finish();
}

fn bench_update_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_builder/update_set");
    let db = Noop;

    for n in [1, 10, 50] {
        let assignments: Vec<(String, Value)> = (0..n)
            .map(|i| (format!("col{i}"), Value::from(format!("value {i}"))))
            .collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(n),
            &assignments,
            |b, assignments| {
                b.iter(|| {
                    let q = db
                        .builder()
                        .update("t")
                        .set(assignments.iter().cloned())
                        .where_("id", Op::Eq, 1);
                    black_box(q.query_text().len());
                });
            },
        );
    }

    group.finish();
}

fn bench_cache_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_builder/cache_key");
    let db = Noop;

    for n in [1, 10, 100] {
        let q = build_select(&db, n);
        let sql = q.query_text().to_string();
        let values = q.bound_values().to_vec();
        group.bench_with_input(
            BenchmarkId::from_parameter(n),
            &(sql, values),
            |b, (sql, values)| {
                b.iter(|| black_box(Driver::MySql.cache_key(sql, values)));
            },
        );
    }

    group.finish();
}

fn bench_injection_screen(c: &mut Criterion) {
    let inputs = [
        "Ana",
        "a perfectly ordinary sentence with no payload at all",
        "x' OR 1=1",
    ];
    c.bench_function("query_builder/find_signature", |b| {
        b.iter(|| {
            for input in &inputs {
                black_box(sqlbridge::inject::find_signature(input));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_build_select,
    bench_update_set,
    bench_cache_key,
    bench_injection_screen
);
criterion_main!(benches);
