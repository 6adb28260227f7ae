/// Status code type alias. Codes are grouped by thousands: the high digits
/// select the subsystem, the low digits the condition.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const DATA_CORRUPTION: status_code_t = 2;
    pub const INVALID_ARG: status_code_t = 3;
    pub const INVALID_CONFIG: status_code_t = 4;
    pub const IO_ERROR: status_code_t = 69;
}

/// Metadata server status codes (3xxx).
pub mod MetaCode {
    use super::status_code_t;

    pub const NOT_FOUND: status_code_t = 3000;
    pub const EXISTS: status_code_t = 3007;
    pub const INCONSISTENT: status_code_t = 3009;
    pub const NOT_AUTHORITY: status_code_t = 3010;
    pub const REQUEST_CANCELED: status_code_t = 3018;
    pub const BUSY: status_code_t = 3019;
    pub const PINNED: status_code_t = 3020;
}

/// Object storage status codes (4xxx).
pub mod StorageCode {
    use super::status_code_t;

    pub const OBJECT_NOT_FOUND: status_code_t = 4001;
    pub const OBJECT_READ_FAILED: status_code_t = 4010;
    pub const OBJECT_WRITE_FAILED: status_code_t = 4011;
    pub const OBJECT_TOO_LARGE: status_code_t = 4015;
    pub const TARGET_OFFLINE: status_code_t = 4030;
    pub const IO_TIMEOUT: status_code_t = 4040;
}

/// Symbolic name of a status code, used when rendering a `Status`.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::DATA_CORRUPTION => "DataCorruption",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::IO_ERROR => "IOError",

        MetaCode::NOT_FOUND => "Meta::NotFound",
        MetaCode::EXISTS => "Meta::Exists",
        MetaCode::INCONSISTENT => "Meta::Inconsistent",
        MetaCode::NOT_AUTHORITY => "Meta::NotAuthority",
        MetaCode::REQUEST_CANCELED => "Meta::RequestCanceled",
        MetaCode::BUSY => "Meta::Busy",
        MetaCode::PINNED => "Meta::Pinned",

        StorageCode::OBJECT_NOT_FOUND => "Storage::ObjectNotFound",
        StorageCode::OBJECT_READ_FAILED => "Storage::ObjectReadFailed",
        StorageCode::OBJECT_WRITE_FAILED => "Storage::ObjectWriteFailed",
        StorageCode::OBJECT_TOO_LARGE => "Storage::ObjectTooLarge",
        StorageCode::TARGET_OFFLINE => "Storage::TargetOffline",
        StorageCode::IO_TIMEOUT => "Storage::IOTimeout",

        _ => "Unrecognized",
    }
}
