//! CSV discharge certificates
//!
//! Each certificate is a pair of files in the report directory:
//! `{REG}_discharge_{YYYYmmdd_HHMMSS}[_TEST].csv` with every sample, and a
//! `.txt` summary next to it.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::session::{
    Certificate, ReportError, ReportSink, SessionMode, SessionStats, SessionSummary,
};

const SAMPLE_HEADERS: [&str; 5] = ["timestamp", "elapsed_s", "voltage_v", "current_a", "power_w"];

#[derive(Debug, Clone)]
pub struct CsvReportSink {
    directory: PathBuf,
}

impl CsvReportSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Base file name without extension
    pub fn file_stem(summary: &SessionSummary) -> String {
        let registration: String = summary
            .registration
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let suffix = match summary.mode {
            SessionMode::Test => "_TEST",
            SessionMode::Real => "",
        };
        format!(
            "{registration}_discharge_{}{suffix}",
            summary.start_time.format("%Y%m%d_%H%M%S")
        )
    }

    fn write_samples(path: &Path, certificate: &Certificate<'_>) -> Result<(), ReportError> {
        let mut wtr = csv::Writer::from_path(path).map_err(|e| ReportError::Io(e.to_string()))?;
        wtr.write_record(SAMPLE_HEADERS)
            .map_err(|e| ReportError::Format(e.to_string()))?;

        for sample in certificate.samples {
            wtr.write_record([
                sample.timestamp.to_rfc3339(),
                format!("{:.3}", sample.elapsed_s),
                format!("{:.3}", sample.voltage),
                format!("{:.3}", sample.current),
                format!("{:.2}", sample.power),
            ])
            .map_err(|e| ReportError::Format(e.to_string()))?;
        }

        wtr.flush().map_err(|e| ReportError::Io(e.to_string()))?;
        Ok(())
    }

    fn render_summary(certificate: &Certificate<'_>) -> Result<String, ReportError> {
        let summary = certificate.summary;
        let stats = SessionStats::from_samples(certificate.samples)
            .ok_or(ReportError::NoSamples(summary.id))?;
        let mut out = String::new();
        Self::write_summary(&mut out, certificate, &stats)
            .map_err(|e| ReportError::Format(e.to_string()))?;
        Ok(out)
    }

    fn write_summary(
        out: &mut String,
        certificate: &Certificate<'_>,
        stats: &SessionStats,
    ) -> std::fmt::Result {
        let summary = certificate.summary;
        writeln!(out, "DISCHARGE CERTIFICATE")?;
        writeln!(out, "=====================")?;
        writeln!(out, "Session:        {}", summary.id)?;
        writeln!(out, "Registration:   {}", summary.registration)?;
        writeln!(out, "Mode:           {}", summary.mode)?;
        writeln!(out, "Profile:        {}", certificate.profile.name)?;
        writeln!(out, "Started:        {}", summary.start_time.to_rfc3339())?;
        match summary.end_time {
            Some(end) => writeln!(out, "Finished:       {}", end.to_rfc3339())?,
            None => writeln!(out, "Finished:       -")?,
        }
        if let Some(idn) = certificate.instrument_idn {
            writeln!(out, "Instrument:     {idn}")?;
        }
        writeln!(out, "Energy:         {:.4} kWh", summary.total_energy_kwh)?;
        writeln!(out, "Duration:       {:.1} s", stats.duration_s)?;
        writeln!(
            out,
            "Voltage:        {:.2} V -> {:.2} V",
            stats.start_voltage, stats.end_voltage
        )?;
        if !summary.comment.is_empty() {
            writeln!(out, "Comment:        {}", summary.comment)?;
        }

        writeln!(out)?;
        writeln!(out, "Profile steps")?;
        for (index, step) in certificate.profile.steps.iter().enumerate() {
            writeln!(out, "  {}. {}", index + 1, step.describe())?;
        }

        writeln!(out)?;
        writeln!(out, "Statistics           min        avg        max")?;
        for (name, spread) in [
            ("Voltage (V)", stats.voltage),
            ("Current (A)", stats.current),
            ("Power (W)", stats.power),
        ] {
            writeln!(
                out,
                "  {name:<14} {:>10.2} {:>10.2} {:>10.2}",
                spread.min, spread.avg, spread.max
            )?;
        }

        writeln!(out)?;
        writeln!(out, "Timeline")?;
        for entry in certificate.timeline {
            let end = entry
                .end_s
                .map_or_else(|| "-".to_string(), |end| format!("{end:.1}"));
            writeln!(
                out,
                "  [{}] {:<24} {:>8.1} s -> {end} s",
                entry.step_index, entry.label, entry.start_s
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportSink for CsvReportSink {
    async fn generate_certificate(
        &self,
        certificate: Certificate<'_>,
    ) -> Result<PathBuf, ReportError> {
        if certificate.samples.is_empty() {
            return Err(ReportError::NoSamples(certificate.summary.id));
        }
        let text = Self::render_summary(&certificate)?;

        fs::create_dir_all(&self.directory).map_err(|e| {
            ReportError::Io(format!("{}: {e}", self.directory.display()))
        })?;
        let stem = Self::file_stem(certificate.summary);
        let csv_path = self.directory.join(format!("{stem}.csv"));
        let txt_path = self.directory.join(format!("{stem}.txt"));

        Self::write_samples(&csv_path, &certificate)?;
        fs::write(&txt_path, text).map_err(|e| ReportError::Io(e.to_string()))?;
        debug!("Summary written to {}", txt_path.display());

        info!(
            "Certificate for session {} written: {} samples",
            certificate.summary.id,
            certificate.samples.len()
        );
        Ok(csv_path)
    }
}
