//! Session persistence and certificate output

pub mod csv_report;
pub mod memory;

pub use csv_report::CsvReportSink;
pub use memory::MemoryStore;
