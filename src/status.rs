//! VISA-compatible status codes returned to the caller alongside every engine result.
//!
//! Engines work in terms of [`crate::error::Error`]; the session registry maps each
//! `Error` onto exactly one `Status` at the point results cross back to the caller
//! (see SPEC_FULL.md §4.11, §7). Completion reasons on a successful read map onto
//! the three `SUCCESS_*` variants.

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    SuccessTermChar,
    SuccessMaxCnt,
    SuccessEnd,
    ErrorTimeout,
    ErrorConnLost,
    ErrorInvSetup,
    ErrorRsrcNfound,
    ErrorRsrcBusy,
    ErrorNsupAttr,
    ErrorIo,
    ErrorAbort,
}
impl Status {
    /// True for any of the `SUCCESS_*` variants.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Status::Success | Status::SuccessTermChar | Status::SuccessMaxCnt | Status::SuccessEnd
        )
    }
}
impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        match err {
            Error::Timeout { .. } => Status::ErrorTimeout,
            Error::ConnectionLost(_) => Status::ErrorConnLost,
            Error::IoError(_) => Status::ErrorIo,
            Error::InvalidResource(_) => Status::ErrorInvSetup,
            Error::ResourceNotFound(_) => Status::ErrorRsrcNfound,
            Error::ResourceBusy(_) => Status::ErrorRsrcBusy,
            Error::NotSupported(_) => Status::ErrorNsupAttr,
            Error::RpcMismatch { .. }
            | Error::RpcAuthError(_)
            | Error::RpcProcUnavailable
            | Error::RpcGarbageArgs => Status::ErrorIo,
            Error::SessionInvalidated(_) | Error::SessionUnusable => Status::ErrorConnLost,
            Error::Unspecified(_)
            | Error::Unimplemented(_)
            | Error::Unhandled(_)
            | Error::BadResponse(_) => Status::ErrorIo,
        }
    }
}

/// Why a `read` stopped. Exactly one reason is ever recorded (SPEC_FULL.md §8, property 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionReason {
    /// The transport's end-of-message indicator fired (VXI-11 `END`, HiSLIP
    /// `DataEndMessage`, USBTMC EOM / short packet).
    End,
    /// The read termination character was matched.
    TermChar,
    /// The caller's requested byte count was reached before END or term-char.
    MaxCount,
}
impl From<CompletionReason> for Status {
    fn from(reason: CompletionReason) -> Self {
        match reason {
            CompletionReason::End => Status::SuccessEnd,
            CompletionReason::TermChar => Status::SuccessTermChar,
            CompletionReason::MaxCount => Status::SuccessMaxCnt,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timeout_maps_to_error_timeout() {
        let err = Error::timeout("no response");
        assert_eq!(Status::from(&err), Status::ErrorTimeout);
    }

    #[test]
    fn completion_reasons_are_distinct_successes() {
        assert_eq!(Status::from(CompletionReason::End), Status::SuccessEnd);
        assert_eq!(Status::from(CompletionReason::TermChar), Status::SuccessTermChar);
        assert_eq!(Status::from(CompletionReason::MaxCount), Status::SuccessMaxCnt);
        assert!(Status::SuccessEnd.is_success());
        assert!(!Status::ErrorTimeout.is_success());
    }
}
