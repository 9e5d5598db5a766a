// ============================================================================
// File: vmbridge/src/messages.rs
// ----------------------------------------------------------------------------
// Message catalog: numeric identifiers, seed result codes, and rendered text
// for every failure class this layer reports.
// ============================================================================

use crate::results::ResultRecord;

/// Module identifier embedded in every rendered message.
pub const MOD_ID: &str = "VMB";

/// Catalog entry: numeric identifier plus the seed codes every outcome of
/// this class starts from. Classifiers look entries up in data tables rather
/// than branching ad hoc, so coverage is testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub id: u16,
    pub overall_rc: i32,
    pub rc: i32,
    pub rs: i32,
    pub errno: i32,
}

impl Message {
    /// Local or environment failure: overallRC 4, rs carries the message id.
    const fn internal(id: u16) -> Self {
        Self {
            id,
            overall_rc: 4,
            rc: 4,
            rs: id as i32,
            errno: 0,
        }
    }

    /// Protocol decode failure: overallRC 25, errno carries the message id.
    /// Distinct from the managed system's own codes because it indicates a
    /// version mismatch between this layer and the managed system.
    const fn decode(id: u16) -> Self {
        Self {
            id,
            overall_rc: 25,
            rc: 4,
            rs: 0,
            errno: id as i32,
        }
    }

    /// Failure reported by the remote-command transport; rc/rs are filled in
    /// by the classifier from the transport's own codes.
    const fn reported(id: u16) -> Self {
        Self {
            id,
            overall_rc: 2,
            rc: 0,
            rs: 0,
            errno: 0,
        }
    }

    /// Timed-out or permission-denied subprocess: fixed rc/rs pair.
    const fn timed_out(id: u16) -> Self {
        Self {
            id,
            overall_rc: 3,
            rc: 64,
            rs: 408,
            errno: 0,
        }
    }

    /// Default codes for this class with an empty response.
    pub fn seed(&self) -> ResultRecord {
        ResultRecord {
            overall_rc: self.overall_rc,
            rc: self.rc,
            rs: self.rs,
            errno: self.errno,
            response: String::new(),
        }
    }

    /// Default codes plus a rendered diagnostic.
    pub fn record<R: Into<String>>(&self, response: R) -> ResultRecord {
        self.seed().with_response(response)
    }

    /// Message tag prefixed to rendered text, e.g. `VMB0415E`.
    pub fn tag(&self) -> String {
        format!("{MOD_ID}{:04}E", self.id)
    }
}

// Management-API response decoding.
pub const SMAPI_FAILED: Message = Message::reported(300);
pub const SMAPI_HEADER_TOO_SHORT: Message = Message::decode(301);
pub const SMAPI_BAD_OVERALL_RC: Message = Message::decode(302);
pub const SMAPI_BAD_RC: Message = Message::decode(303);
pub const SMAPI_BAD_RS: Message = Message::decode(304);
pub const SMAPI_SPAWN_FAILED: Message = Message::decode(305);

// Remote-command transport classification.
pub const TRANSPORT_BAD_RETURN_CODE: Message = Message::reported(311);
pub const TRANSPORT_BAD_REASON_CODE: Message = Message::reported(312);
pub const TRANSPORT_UNAUTHORIZED: Message = Message::reported(313);
pub const TRANSPORT_PARAMETER_ERROR: Message = Message::reported(314);
pub const TRANSPORT_SOCKET_ERROR: Message = Message::reported(315);
pub const TRANSPORT_EXEC_FAILED: Message = Message::reported(316);
pub const TRANSPORT_FILE_TRANSFER_FAILED: Message = Message::reported(317);
pub const TRANSPORT_SERVER_MISSING: Message = Message::reported(318);
pub const TRANSPORT_UNRECOGNIZED: Message = Message::reported(319);
pub const TRANSPORT_TIMED_OUT: Message = Message::timed_out(320);

// Spool workflow.
pub const PUNCH_FAILED: Message = Message::internal(401);
pub const PURGE_FAILED: Message = Message::internal(403);
pub const CLASS_CHANGE_FAILED: Message = Message::internal(404);
pub const PUNCH_TIMED_OUT: Message = Message::internal(406);

// Local command execution and polling.
pub const PERF_PARSE_FAILED: Message = Message::internal(412);
pub const OS_STATE_TIMED_OUT: Message = Message::internal(413);
pub const VM_STATE_TIMED_OUT: Message = Message::internal(414);
pub const COMMAND_FAILED: Message = Message::internal(415);
pub const DEVICE_TOKEN_SHORTAGE: Message = Message::internal(416);
pub const DEVICE_MARKER_MISSING: Message = Message::internal(417);
pub const INTERNAL_ERROR: Message = Message::internal(421);
pub const TRANSFER_FAILED: Message = Message::internal(424);
pub const OPERATION_TIMED_OUT: Message = Message::timed_out(501);

/// Transport return-code classification table: rc reported by the transport
/// client mapped to its message class and descriptive phrase.
pub const TRANSPORT_CLASSES: &[(i32, Message, &str)] = &[
    (1, TRANSPORT_UNAUTHORIZED, "command was not authorized or failed with a generic error"),
    (2, TRANSPORT_PARAMETER_ERROR, "transport client parameter error"),
    (4, TRANSPORT_SOCKET_ERROR, "transport socket error"),
    (8, TRANSPORT_EXEC_FAILED, "executed command failed"),
    (16, TRANSPORT_FILE_TRANSFER_FAILED, "file transport failed"),
    (32, TRANSPORT_SERVER_MISSING, "transport server was not found on the target system"),
];

/// Look up the message class for a transport return code.
pub fn transport_class(rc: i32) -> (Message, &'static str) {
    TRANSPORT_CLASSES
        .iter()
        .find(|(code, _, _)| *code == rc)
        .map(|(_, msg, phrase)| (*msg, *phrase))
        .unwrap_or((TRANSPORT_UNRECOGNIZED, "unrecognized transport client error"))
}

pub fn command_failed_text(cmd: &str, status: i32, output: &str) -> String {
    format!(
        "{} {MOD_ID} Command failed: '{cmd}', rc: {status}, out: '{output}'",
        COMMAND_FAILED.tag()
    )
}

pub fn internal_error_text(cmd: &str, detail: &str) -> String {
    format!(
        "{} {MOD_ID} Exception received on an attempt to communicate with the \
         managed system, cmd: '{cmd}', exception: {detail}",
        INTERNAL_ERROR.tag()
    )
}

pub fn operation_timed_out_text(cmd: &str, detail: &str) -> String {
    format!(
        "{} {MOD_ID} Command timed out: '{cmd}', detail: {detail}",
        OPERATION_TIMED_OUT.tag()
    )
}

pub fn transport_class_text(
    msg: &Message,
    phrase: &str,
    userid: &str,
    cmd: &str,
    rc: i32,
    rs: i32,
    output: &str,
) -> String {
    format!(
        "{} {MOD_ID} On {userid}, {phrase}: cmd: '{cmd}', rc: {rc}, rs: {rs}, out: '{output}'",
        msg.tag()
    )
}

pub fn transport_bad_token_text(
    msg: &Message,
    which: &str,
    userid: &str,
    cmd: &str,
    rc: i32,
    token: &str,
    output: &str,
) -> String {
    format!(
        "{} {MOD_ID} On {userid}, the {which} code in the transport response is \
         not an integer: cmd: '{cmd}', rc: {rc}, token: '{token}', out: '{output}'",
        msg.tag()
    )
}

pub fn transport_timed_out_text(userid: &str, cmd: &str, detail: &str) -> String {
    format!(
        "{} {MOD_ID} On {userid}, command timed out or was denied: cmd: '{cmd}', \
         rc: {}, rs: {}, detail: {detail}",
        TRANSPORT_TIMED_OUT.tag(),
        TRANSPORT_TIMED_OUT.rc,
        TRANSPORT_TIMED_OUT.rs
    )
}

pub fn smapi_failure_text(
    api: &str,
    codes: &ResultRecord,
    cmd: &str,
    detail_tail: &str,
    payload: &str,
) -> String {
    format!(
        "{} {MOD_ID} SMAPI API failed: {api}, overallRC: {}, rc: {}, rs: {}, \
         errno: {}, cmd: '{cmd}', details: '{detail_tail}', out: '{payload}'",
        SMAPI_FAILED.tag(),
        codes.overall_rc,
        codes.rc,
        codes.rs,
        codes.errno
    )
}

pub fn smapi_malformed_text(
    msg: &Message,
    api: &str,
    cmd: &str,
    header: &str,
    detail_tail: &str,
) -> String {
    format!(
        "{} {MOD_ID} Unexpected response header from the management API for \
         {api}: cmd: '{cmd}', header: '{header}', details: '{detail_tail}'",
        msg.tag()
    )
}

pub fn smapi_spawn_failed_text(cmd: &str, detail: &str) -> String {
    format!(
        "{} {MOD_ID} Failed to invoke the management API client: cmd: '{cmd}', \
         exception: {detail}",
        SMAPI_SPAWN_FAILED.tag()
    )
}

pub fn state_timeout_text(msg: &Message, userid: &str, desired: &str, max_wait_secs: u64) -> String {
    format!(
        "{} {MOD_ID} Userid '{userid}' did not enter the expected state \
         '{desired}' within {max_wait_secs} seconds",
        msg.tag()
    )
}

pub fn punch_failed_text(file: &str, userid: &str, output: &str) -> String {
    format!(
        "{} {MOD_ID} Failed to punch file '{file}' to the reader of {userid}: '{output}'",
        PUNCH_FAILED.tag()
    )
}

pub fn purge_failed_text(spool_id: &str, output: &str) -> String {
    format!(
        "{} {MOD_ID} Failed to purge spool file {spool_id}: '{output}'",
        PURGE_FAILED.tag()
    )
}

pub fn class_change_failed_text(spool_class: &str, output: &str) -> String {
    format!(
        "{} {MOD_ID} Failed to change the spool class to {spool_class}: '{output}'",
        CLASS_CHANGE_FAILED.tag()
    )
}

pub fn punch_timed_out_text(file: &str) -> String {
    format!(
        "{} {MOD_ID} Timed out punching file '{file}': the spooling device stayed busy",
        PUNCH_TIMED_OUT.tag()
    )
}

pub fn perf_parse_failed_text(detail: &str, payload: &str) -> String {
    format!(
        "{} {MOD_ID} Failed to parse the performance query payload: {detail}, \
         out: '{payload}'",
        PERF_PARSE_FAILED.tag()
    )
}

pub fn device_marker_missing_text(marker: &str, cmd: &str, output: &str) -> String {
    format!(
        "{} {MOD_ID} Marker '{marker}' was not found in the output of \
         '{cmd}': '{output}'",
        DEVICE_MARKER_MISSING.tag()
    )
}

pub fn device_token_shortage_text(marker: &str, want: usize, cmd: &str, output: &str) -> String {
    format!(
        "{} {MOD_ID} Expected at least {want} words after marker '{marker}' in \
         the output of '{cmd}': '{output}'",
        DEVICE_TOKEN_SHORTAGE.tag()
    )
}

pub fn transfer_failed_text(file: &str, userid: &str, output: &str) -> String {
    format!(
        "{} {MOD_ID} Failed to transfer file '{file}' to the reader of {userid}: '{output}'",
        TRANSFER_FAILED.tag()
    )
}
