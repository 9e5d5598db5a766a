// ============================================================================
// File: vmbridge/src/smapi/mod.rs
// ----------------------------------------------------------------------------
// Management-API invocation: command assembly, timeout class selection, and
// decoding of the versioned response header into structured codes.
// ============================================================================

pub mod queries;
mod status;

pub use status::{SmapiHealth, smapi_health};

use crate::config::SmapiTimeouts;
use crate::context::RequestContext;
use crate::messages;
use crate::results::ResultRecord;
use crate::runner::{CmdError, CommandExec, CommandSpec};

/// Path of the management-API client on the management node.
pub const SMAPI_CLIENT: &str = "/opt/zthin/bin/smcli";

/// Makes the client prefix its output with the decodable code header.
const RC_HEADER_FLAG: &str = "--addRCheader";

/// Marker splitting the header codes from the detail tail.
const DETAILS_MARKER: &str = "(details)";

/// APIs holding the management socket for the duration of a relocation or
/// resize; they get the long-call timeout class.
const LONG_CALL_APIS: &[&str] = &["VMRELOCATE"];

/// Overall return codes the management API is allowed to report.
const ACCEPTED_OVERALL_RCS: &[i32] = &[8, 24, 25];

/// Number of argv words before the caller's parameters in the display line,
/// used to shift caller-supplied sensitive parameter indices.
const PARM_WORD_OFFSET: usize = 4;

/// Invokes the administrative management API and decodes its responses.
pub struct SmapiInvoker<'r> {
    runner: &'r dyn CommandExec,
    timeouts: SmapiTimeouts,
}

impl<'r> SmapiInvoker<'r> {
    pub fn new(runner: &'r dyn CommandExec, timeouts: SmapiTimeouts) -> Self {
        Self { runner, timeouts }
    }

    /// Invoke `api` with `parms`, decoding the response header into codes.
    ///
    /// `hide_in_log` holds indices into `parms` to mask in audit lines.
    /// Every attempt is recorded to the rolling channel health tracker.
    pub fn invoke(
        &self,
        ctx: &dyn RequestContext,
        api: &str,
        parms: &[&str],
        hide_in_log: &[usize],
    ) -> ResultRecord {
        let timeout_secs = timeout_for(api, &self.timeouts);
        let timeout_str = timeout_secs.to_string();

        let mut argv: Vec<&str> = vec!["sudo", SMAPI_CLIENT, api, RC_HEADER_FLAG];
        argv.extend_from_slice(parms);
        argv.push("--timeout");
        argv.push(&timeout_str);

        let spec = CommandSpec::argv(argv)
            .with_hidden(hide_in_log.iter().map(|i| i + PARM_WORD_OFFSET));
        let cmd_line = spec.masked_line();
        ctx.sys_log(&format!(
            "Enter SMAPI invoke, userid: {}, function: {api}, timeout: {timeout_secs}s, cmd: {cmd_line}",
            ctx.userid()
        ));

        let health = smapi_health();
        let record = match self.runner.execute(ctx, &spec) {
            Ok(output) => {
                health.record_success();
                // Everything after the header line is the payload.
                let payload = output.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
                ResultRecord::ok_with(payload)
            }
            Err(CmdError::NonZero { output, .. }) => {
                health.record_failure();
                decode_failure(api, &cmd_line, &output)
            }
            Err(err) => {
                health.record_failure();
                messages::SMAPI_SPAWN_FAILED
                    .record(messages::smapi_spawn_failed_text(&cmd_line, &err.to_string()))
            }
        };

        ctx.sys_log(&format!("Exit SMAPI invoke, rc: {}", record.overall_rc));
        record
    }
}

/// Select the timeout class for an API name.
pub fn timeout_for(api: &str, timeouts: &SmapiTimeouts) -> u64 {
    if LONG_CALL_APIS.contains(&api) {
        timeouts.long_call()
    } else {
        timeouts.general()
    }
}

/// Decode the failure response of the management-API client.
///
/// The first output line is split on the `(details)` marker into a header of
/// whitespace-separated code words and a detail tail. The header must carry
/// at least three words: overall return code (accepted values exactly 8, 24,
/// 25), return code, and a third word read as rs when the overall code is 8
/// and as errno when it is 25. Anything that does not decode is reported as a
/// malformed response, distinct from the managed system's own codes.
pub(crate) fn decode_failure(api: &str, cmd_line: &str, raw: &str) -> ResultRecord {
    let (first_line, payload) = raw.split_once('\n').unwrap_or((raw, ""));
    let (header, detail_tail) = first_line
        .split_once(DETAILS_MARKER)
        .unwrap_or((first_line, ""));
    let detail_tail = detail_tail.trim_start();

    let codes: Vec<&str> = header.split_whitespace().collect();
    if codes.len() < 3 {
        let msg = messages::SMAPI_HEADER_TOO_SHORT;
        return msg.record(messages::smapi_malformed_text(
            &msg, api, cmd_line, header, detail_tail,
        ));
    }

    let overall_rc = match codes[0].parse::<i32>() {
        Ok(v) if ACCEPTED_OVERALL_RCS.contains(&v) => v,
        // Forced to the internal-error domain: the header does not carry a
        // code this layer knows how to interpret.
        _ => {
            let msg = messages::SMAPI_BAD_OVERALL_RC;
            return msg.record(messages::smapi_malformed_text(
                &msg, api, cmd_line, header, detail_tail,
            ));
        }
    };

    let rc = match codes[1].parse::<i32>() {
        Ok(v) => v,
        Err(_) => {
            let msg = messages::SMAPI_BAD_RC;
            return msg.record(messages::smapi_malformed_text(
                &msg, api, cmd_line, header, detail_tail,
            ));
        }
    };

    let word3 = match codes[2].parse::<i32>() {
        Ok(v) => v,
        Err(_) => {
            let msg = messages::SMAPI_BAD_RS;
            return msg.record(messages::smapi_malformed_text(
                &msg, api, cmd_line, header, detail_tail,
            ));
        }
    };
    let (rs, errno) = match overall_rc {
        8 => (word3, 0),
        25 => (0, word3),
        // Word 3 is ignored for everything else.
        _ => (0, 0),
    };

    let codes_record = ResultRecord {
        overall_rc,
        rc,
        rs,
        errno,
        response: String::new(),
    };
    let response =
        messages::smapi_failure_text(api, &codes_record, cmd_line, detail_tail, payload);
    codes_record.with_response(response)
}
