//! Query operations built on the management-API invoker.

use crate::context::RequestContext;
use crate::messages;
use crate::results::ResultRecord;

use super::SmapiInvoker;

/// Fetch and reformat the performance numbers for the context userid.
///
/// The raw payload is scraped line by line; CPU time arrives in microseconds
/// and memory sizes in kilobytes, and both are converted before formatting.
pub fn get_perf_info(invoker: &SmapiInvoker<'_>, ctx: &dyn RequestContext) -> ResultRecord {
    ctx.sys_log(&format!("Enter perf query, userid: {}", ctx.userid()));

    let userid = ctx.userid().to_string();
    let record = invoker.invoke(
        ctx,
        "System_Image_Performance_Query",
        &["-T", &userid],
        &[],
    );
    if !record.is_ok() {
        ctx.announce(&record.response);
        ctx.sys_log(&format!("Exit perf query, rc: {}", record.overall_rc));
        return record;
    }

    let record = match format_perf(&record.response) {
        Ok(summary) => record.with_response(summary),
        Err(detail) => {
            let rendered = messages::perf_parse_failed_text(&detail, &record.response);
            ctx.announce(&rendered);
            messages::PERF_PARSE_FAILED.record(rendered)
        }
    };

    ctx.sys_log(&format!("Exit perf query, rc: {}", record.overall_rc));
    record
}

/// Purge the reader of the context userid.
pub fn purge_reader(invoker: &SmapiInvoker<'_>, ctx: &dyn RequestContext) -> ResultRecord {
    ctx.sys_log(&format!("Enter reader purge, userid: {}", ctx.userid()));

    let userid = ctx.userid().to_string();
    let record = invoker.invoke(
        ctx,
        "System_RDR_File_Manage",
        &["-T", &userid, "-k", "spoolids=all"],
        &[],
    );
    if !record.is_ok() {
        ctx.announce(&record.response);
    }

    ctx.sys_log(&format!("Exit reader purge, rc: {}", record.overall_rc));
    record
}

/// Reformat the performance query payload into the operator summary.
pub(crate) fn format_perf(payload: &str) -> Result<String, String> {
    let mut used_time_secs: u64 = 0;
    let mut total_cpus = String::from("0");
    let mut total_mem_mb: u64 = 0;
    let mut used_mem_mb: u64 = 0;

    for line in payload.lines() {
        if line.contains("Used CPU time:") {
            // Reported in microseconds.
            used_time_secs = field(line, 3)? / 1_000_000;
        } else if line.contains("Guest CPUs:") {
            total_cpus = word(line, 2)?;
        } else if line.contains("Max memory:") {
            // Reported in kilobytes.
            total_mem_mb = field(line, 2)? / 1024;
        } else if line.contains("Used memory:") {
            used_mem_mb = field(line, 2)? / 1024;
        }
    }

    Ok(format!(
        "Total Memory: {total_mem_mb}M\nUsed Memory: {used_mem_mb}M\n\
         Processors: {total_cpus}\nCPU Used Time: {used_time_secs} sec\n"
    ))
}

fn word(line: &str, index: usize) -> Result<String, String> {
    line.split_whitespace()
        .nth(index)
        .map(|w| w.trim_matches('"').to_string())
        .ok_or_else(|| format!("missing word {index} in line '{line}'"))
}

fn field(line: &str, index: usize) -> Result<u64, String> {
    let token = word(line, index)?;
    token
        .parse()
        .map_err(|_| format!("word '{token}' in line '{line}' is not a number"))
}
