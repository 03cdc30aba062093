//! Reply formatting
//!
//! Control-channel replies are single CRLF-terminated lines of the form
//! `<3-digit code> <text>`. The codes below are the complete set this
//! server emits; clients rely on the exact numbers.

pub const OPENING_DATA_CONNECTION: u16 = 150;
pub const OK: u16 = 200;
pub const FEATURES: u16 = 211;
pub const FILE_STATUS: u16 = 213;
pub const SYSTEM_TYPE: u16 = 215;
pub const READY: u16 = 220;
pub const GOODBYE: u16 = 221;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const ENTERING_PASSIVE_MODE: u16 = 227;
pub const LOGIN_SUCCESS: u16 = 230;
pub const ACTION_COMPLETE: u16 = 250;
pub const PATH_CREATED: u16 = 257;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const CANT_OPEN_DATA_CONNECTION: u16 = 425;
pub const TRANSFER_ABORTED: u16 = 451;
pub const NOT_IMPLEMENTED: u16 = 502;
pub const BAD_PARAMETER: u16 = 504;
pub const NOT_LOGGED_IN: u16 = 530;
pub const FILE_UNAVAILABLE: u16 = 550;

/// A single control-channel reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    /// The wire form, CRLF included.
    pub fn line(&self) -> String {
        format!("{} {}\r\n", self.code, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_is_code_space_text_crlf() {
        let reply = Reply::new(READY, "Vigil FTP service ready.");
        assert_eq!(reply.line(), "220 Vigil FTP service ready.\r\n");
    }
}
