//! Basic usage: generate demo forestry records, persist them, read them back.
//!
//! Run with: `cargo run --example basic_usage`

use forest_store::dst::{DeterministicRng, SimConfig};
use forest_store::telemetry::{init_tracing, TelemetryConfig};
use forest_store::{
    FileKeyValueStore, Record, RecordMeta, SimObjectStore, StorageManager, StoreConfig,
};

const FOREST_FARMS: &[&str] = &["北坡新村", "北坡旺基", "北坡港门", "南山林场", "东山林场"];
const FOREST_TEAMS: &[&str] = &["北坡", "南山", "东山", "西林", "中林"];
const SUB_COMPARTMENTS: &[&str] = &["新村", "旺基塘", "港门", "南山001", "东山002", "西林003", "中林004"];
const RENEWAL_METHODS: &[&str] = &["植苗", "直播", "嫁接", "扦插"];
const OPERATIONS: &[&str] = &["清理迹地", "下挖树头直接全垦", "机开沟", "机犁草全垦", "机全垦", "人工整地", "施肥作业"];
const OPERATORS: &[&str] = &["黄德生", "妃尾", "马妹", "蔡彪", "张三", "李四", "王五", "赵六"];
const INSPECTORS: &[&str] = &["验收员A", "验收员B", "验收员C"];
const YEARS: &[u64] = &[2015, 2016, 2017, 2018, 2019, 2020];

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

fn date(rng: &mut DeterministicRng, year: u64) -> String {
    format!(
        "{year}.{:02}.{:02}",
        rng.next_usize(1, 12),
        rng.next_usize(1, 28)
    )
}

/// Rows shaped like a site-preparation sheet.
fn demo_records(rng: &mut DeterministicRng, count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let year = *rng.choose(YEARS);
            let area = round_to(rng.next_float() * 500.0 + 10.0, 1);
            let unit_price = (rng.next_float() * 50.0 + 5.0).round();
            let investment = round_to(area * unit_price, 2);

            let mut record = Record::new(RecordMeta::new(format!("demo_{i}"), "整地", i as u64 + 2))
                .with_field("林场", *rng.choose(FOREST_FARMS))
                .with_field("林队", *rng.choose(FOREST_TEAMS))
                .with_field("小班", *rng.choose(SUB_COMPARTMENTS))
                .with_field("更新方式", *rng.choose(RENEWAL_METHODS))
                .with_field("更新年度", year)
                .with_field("作业面积", area)
                .with_field("作业内容", *rng.choose(OPERATIONS))
                .with_field("作业完成日期", date(rng, year))
                .with_field("投资标准", unit_price)
                .with_field("投资标准.1", investment)
                .with_field("作业人", *rng.choose(OPERATORS))
                .with_field("验收人", *rng.choose(INSPECTORS))
                .with_field("验收日期", date(rng, year));
            if i % 3 == 0 {
                record.set("备注", "风害皆伐小班");
            }
            record
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&TelemetryConfig::builder().filter("forest_store=info").build())?;

    let dir = tempfile::tempdir()?;
    let manager = StorageManager::new(
        FileKeyValueStore::open(dir.path())?,
        SimObjectStore::new(SimConfig::with_seed(42)),
    )
    .with_config(StoreConfig::default());
    let mut rng = DeterministicRng::new(42);

    for count in [100, 8_000] {
        let records = demo_records(&mut rng, count);
        let size = manager.estimate_size(&records);
        println!("\n{count} records, {size} bytes of JSON");

        let result = manager
            .save(&records, &|percent: f64| {
                if percent >= 100.0 {
                    println!("  progress: {percent:.0}%");
                }
            })
            .await;
        println!(
            "  saved: success={} backend={:?} batches={}",
            result.success, result.storage_type, result.batch_count
        );

        let info = manager.storage_info().await;
        if let Some(kv) = &info.key_value {
            println!("  key-value: {} records, {:.2} MiB", kv.info.total_count, kv.size_mib());
        }
        if let Some(objects) = &info.object_store {
            println!("  object store: {} records in {} batches", objects.total_count, objects.total_batches);
        }

        let loaded = manager.load().await.ok_or_else(|| anyhow::anyhow!("nothing loaded"))?;
        assert_eq!(loaded.records, records);
        println!("  loaded {} records from {}", loaded.records.len(), loaded.storage_type);
    }

    manager.clear_all().await;
    println!("\ncleared: {:?}", manager.storage_info().await.current);
    Ok(())
}
