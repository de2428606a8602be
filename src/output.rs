use crate::pipeline::{PipelineReport, ProgressEvent, ProgressSink};

/// Forwards pipeline progress to `tracing`.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

pub fn print_summary(report: &PipelineReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}HisDB summary{reset}");
    println!(
        "{green}public pairs: {}, private pairs: {}{reset}",
        report.public_pairs, report.private_pairs
    );
    for rename in &report.renamed {
        println!("{yellow}renamed {} -> {}{reset}", rename.from, rename.to);
    }
    for summary in &report.collections {
        let counts = summary
            .partitions
            .iter()
            .map(|count| format!("{}={}", count.partition, count.data))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{cyan}{:<8}{reset} {counts}", summary.collection.as_str());
    }
    println!("Finished. Data set up at {}.", report.root);
}
