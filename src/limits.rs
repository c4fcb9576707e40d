use crate::model::Ms;

pub const MS_PER_DAY: Ms = 86_400_000;

pub const MAX_TENANTS: usize = 256;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_ROOMS_PER_TENANT: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 50_000;
pub const MAX_CATALOG_ENTRIES_PER_TENANT: usize = 100_000;

/// Max bytes for any user-supplied text field (room number, guest name, SKU, ...).
pub const MAX_NAME_LEN: usize = 256;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const MAX_STAY_MS: Ms = 366 * MS_PER_DAY;
