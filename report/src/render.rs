//! Text and JSON rendering of a [`Summary`]

use std::fmt::Write as _;

use crate::summary::Summary;

/// Plain-text report for a terminal
pub fn render_text(summary: &Summary) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_text(&mut out, summary);
    out
}

/// Pretty-printed JSON report
///
/// # Errors
/// Propagates serializer failures.
pub fn render_json(summary: &Summary) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summary)
}

fn write_text(out: &mut String, s: &Summary) -> std::fmt::Result {
    writeln!(out, "Summary:")?;
    writeln!(out, "  Elapsed          {:.3}s", s.elapsed_secs)?;
    writeln!(out, "  Count            {}", s.requests)?;
    for (code, count) in &s.status_codes {
        writeln!(out, "    {code}            {count}")?;
    }
    if s.failures > 0 {
        writeln!(out, "    errors         {}", s.failures)?;
    }
    writeln!(out, "  RPS              {:.3}", s.requests_per_second)?;
    writeln!(
        out,
        "  Reads            {} ({}/s)",
        human_bytes(s.read_bytes as f64),
        human_bytes(s.read_bytes_per_second)
    )?;
    writeln!(
        out,
        "  Writes           {} ({}/s)",
        human_bytes(s.write_bytes as f64),
        human_bytes(s.write_bytes_per_second)
    )?;
    writeln!(out, "  Max concurrency  {}", s.max_concurrency)?;

    let l = &s.latency;
    writeln!(out)?;
    writeln!(
        out,
        "Latency (ms)  {:>10} {:>10} {:>10} {:>10}",
        "Min", "Mean", "StdDev", "Max"
    )?;
    writeln!(
        out,
        "              {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
        l.min, l.mean, l.stddev, l.max
    )?;
    writeln!(
        out,
        "Percentiles   {:>10} {:>10} {:>10} {:>10}",
        "P50", "P90", "P95", "P99"
    )?;
    writeln!(
        out,
        "              {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
        l.p50, l.p90, l.p95, l.p99
    )?;

    if !s.errors.is_empty() {
        writeln!(out)?;
        writeln!(out, "Errors:")?;
        for (error, count) in &s.errors {
            writeln!(out, "  {count:>8}  {error}")?;
        }
    }
    Ok(())
}

fn human_bytes(n: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryCollector;
    use std::time::Duration;
    use volley_core::ReportRecord;

    fn summary() -> Summary {
        let mut collector = SummaryCollector::new();
        collector.record(&ReportRecord {
            cost: Duration::from_millis(12),
            code: 200,
            read_bytes: 4096,
            write_bytes: 100,
            concurrency: 3,
            ..Default::default()
        });
        collector.record(&ReportRecord {
            error: "dial error: 127.0.0.1:1: refused".into(),
            ..Default::default()
        });
        collector.finish(Duration::from_secs(2))
    }

    #[test]
    fn test_text_report() {
        let text = render_text(&summary());
        assert!(text.starts_with("Summary:\n"));
        assert!(text.contains("  Count            2\n"));
        assert!(text.contains("    200            1\n"));
        assert!(text.contains("    errors         1\n"));
        assert!(text.contains("4.00 KiB (2.00 KiB/s)"));
        assert!(text.contains("Max concurrency  3"));
        assert!(text.contains("       1  dial error: 127.0.0.1:1: refused"));
    }

    #[test]
    fn test_text_report_without_errors_has_no_error_section() {
        let text = render_text(&SummaryCollector::new().finish(Duration::from_secs(1)));
        assert!(!text.contains("Errors:"));
    }

    #[test]
    fn test_json_report() {
        let json = render_json(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["requests"], 2);
        assert_eq!(value["failures"], 1);
        assert_eq!(value["latency"]["max"], 12.0);
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0.0), "0 B");
        assert_eq!(human_bytes(1023.0), "1023 B");
        assert_eq!(human_bytes(1536.0), "1.50 KiB");
        assert_eq!(human_bytes(3.0 * 1024.0 * 1024.0), "3.00 MiB");
    }
}
