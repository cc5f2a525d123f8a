use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Days, Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::ArrowWriter;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Daily cycle around `base` with noise, never below a small floor.
fn reading(rng: &mut SimpleRng, base: f64, hour: u32) -> f64 {
    let phase = (hour as f64 / 24.0) * 2.0 * std::f64::consts::PI;
    (base * (1.0 + 0.2 * phase.sin()) + rng.gauss(0.0, base * 0.05)).max(0.01)
}

fn start_date() -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid start date")
}

/// Long-format snapshot: one row per (timestamp, source, value).
fn write_snapshot(rng: &mut SimpleRng, path: &str, days: u64) -> Result<usize> {
    let sources = [("ETA Bruta", 4.0), ("ETA Tratada", 0.3), ("Poço 2", 1.2)];
    let start: NaiveDateTime = start_date()?
        .and_hms_opt(0, 0, 0)
        .context("invalid start time")?;

    let mut timestamps = Vec::new();
    let mut labels = Vec::new();
    let mut values = Vec::new();
    for hour in 0..days * 24 {
        let ts = start + Duration::hours(hour as i64);
        for (name, base) in &sources {
            timestamps.push(ts.and_utc().timestamp_millis());
            labels.push(*name);
            values.push(reading(rng, *base, (hour % 24) as u32));
        }
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("DataHoraReal", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new("Fonte", DataType::Utf8, false),
        Field::new("Valor", DataType::Float64, false),
    ]));
    let rows = values.len();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(TimestampMillisecondArray::from(timestamps)),
            Arc::new(StringArray::from(labels)),
            Arc::new(Float64Array::from(values)),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(rows)
}

/// Wide export the way the lab sheet looks: a title row, a header row,
/// the date only on the first day of each week, `<` markers, decimal
/// commas and the occasional sensor sentinel.
fn write_wide_csv(rng: &mut SimpleRng, path: &str, days: u64) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("creating {path}"))?;
    let hours: Vec<String> = (1..=24).map(|h| format!("{h:02}:00")).collect();

    writer.write_record(["Relatório de turbidez"])?;
    writer.write_record(std::iter::once("Data").chain(hours.iter().map(String::as_str)))?;

    for day in 0..days {
        let date = start_date()?
            .checked_add_days(Days::new(day))
            .context("date overflow")?;
        let date_cell = if day % 7 == 0 {
            date.format("%d/%m/%Y").to_string()
        } else {
            String::new()
        };
        let cells = (1..=24u32).map(|hour| {
            let roll = rng.next_f64();
            let value = reading(rng, 0.3, hour);
            let text = format!("{value:.2}").replace('.', ",");
            if roll < 0.02 {
                "99999".to_string()
            } else if roll < 0.04 {
                String::new()
            } else if value < 0.25 {
                format!("<{text}")
            } else {
                text
            }
        });
        let row: Vec<String> = std::iter::once(date_cell).chain(cells).collect();
        writer.write_record(&row)?;
    }
    writer.flush().with_context(|| format!("writing {path}"))?;
    Ok(())
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);
    let days = 60;

    let snapshot_path = "sample_snapshot.parquet";
    let rows = write_snapshot(&mut rng, snapshot_path, days)?;
    println!("Wrote {rows} readings to {snapshot_path}");

    let csv_path = "sample_export.csv";
    write_wide_csv(&mut rng, csv_path, days)?;
    println!("Wrote {days} days of hourly readings to {csv_path}");
    Ok(())
}
