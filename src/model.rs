use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Unix milliseconds (UTC). All timestamps use this type.
pub type Ms = i64;

/// Engine-assigned numeric identity, unique per entity kind within a tenant.
pub type Id = u64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Rooms ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Booked,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "Available",
            RoomStatus::Booked => "Booked",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "available" => Ok(RoomStatus::Available),
            "booked" => Ok(RoomStatus::Booked),
            other => Err(format!("unknown room status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Id,
    pub room_number: String,
    pub room_type: String,
    /// Nightly rate.
    pub price: f64,
    pub status: RoomStatus,
}

/// Input for room creation; identity is assigned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRoom {
    pub room_number: String,
    pub room_type: String,
    pub price: f64,
    pub status: RoomStatus,
}

/// Partial room update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPatch {
    pub room_number: Option<String>,
    pub room_type: Option<String>,
    pub price: Option<f64>,
    pub status: Option<RoomStatus>,
}

impl RoomPatch {
    pub fn is_empty(&self) -> bool {
        self.room_number.is_none()
            && self.room_type.is_none()
            && self.price.is_none()
            && self.status.is_none()
    }

    pub fn apply(&self, room: &Room) -> Room {
        Room {
            id: room.id,
            room_number: self.room_number.clone().unwrap_or_else(|| room.room_number.clone()),
            room_type: self.room_type.clone().unwrap_or_else(|| room.room_type.clone()),
            price: self.price.unwrap_or(room.price),
            status: self.status.unwrap_or(room.status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomSortKey {
    Id,
    RoomNumber,
    Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSort {
    pub key: RoomSortKey,
    pub descending: bool,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::CheckedIn => "CheckedIn",
            BookingStatus::CheckedOut => "CheckedOut",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    /// Whether a booking in this status occupies its date range.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    /// Whether the guest still holds the room (prevents room deletion).
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::CheckedIn)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Confirmed, BookingStatus::CheckedIn)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::CheckedIn, BookingStatus::CheckedOut)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "checkedin" => Ok(BookingStatus::CheckedIn),
            "checkedout" => Ok(BookingStatus::CheckedOut),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("unknown booking status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Id,
    pub room_id: Id,
    pub guest_name: String,
    /// `[check_in, check_out)`
    pub span: Span,
    pub total: f64,
    pub status: BookingStatus,
}

impl Booking {
    pub fn check_in(&self) -> Ms {
        self.span.start
    }

    pub fn check_out(&self) -> Ms {
        self.span.end
    }
}

/// A reservation request as received from the caller. Absent fields are
/// rejected by the engine rather than defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingRequest {
    pub guest_name: String,
    pub room_id: Option<Id>,
    pub check_in: Option<Ms>,
    pub check_out: Option<Ms>,
}

/// A booking joined with the room it references.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingInfo {
    pub booking: Booking,
    pub room: Room,
}

/// Per-room state: the room record plus its bookings, sorted by check-in.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Soft-delete marker. Deleted rooms stay joinable from their bookings.
    pub deleted: bool,
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            deleted: false,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.span.start <= booking.span.start);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Id) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Id) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps the query window, in check-in order.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    pub fn has_active_bookings(&self) -> bool {
        self.bookings.iter().any(|b| b.status.is_active())
    }
}

// ── Catalog (menu, inventory, users) ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogKind {
    MenuItem,
    InventoryItem,
    User,
}

impl CatalogKind {
    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::MenuItem => "menu_items",
            CatalogKind::InventoryItem => "inventory",
            CatalogKind::User => "users",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Id,
    pub name: String,
    pub category: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Id,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CatalogRecord {
    MenuItem(MenuItem),
    InventoryItem(InventoryItem),
    User(User),
}

impl CatalogRecord {
    pub fn kind(&self) -> CatalogKind {
        match self {
            CatalogRecord::MenuItem(_) => CatalogKind::MenuItem,
            CatalogRecord::InventoryItem(_) => CatalogKind::InventoryItem,
            CatalogRecord::User(_) => CatalogKind::User,
        }
    }

    pub fn id(&self) -> Id {
        match self {
            CatalogRecord::MenuItem(m) => m.id,
            CatalogRecord::InventoryItem(i) => i.id,
            CatalogRecord::User(u) => u.id,
        }
    }

    pub fn with_id(mut self, id: Id) -> Self {
        match &mut self {
            CatalogRecord::MenuItem(m) => m.id = id,
            CatalogRecord::InventoryItem(i) => i.id = id,
            CatalogRecord::User(u) => u.id = id,
        }
        self
    }

    /// The field that must be unique within its kind, if any.
    pub fn unique_key(&self) -> Option<&str> {
        match self {
            CatalogRecord::MenuItem(_) => None,
            CatalogRecord::InventoryItem(i) => Some(&i.sku),
            CatalogRecord::User(u) => Some(&u.username),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuItemPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryItemPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub quantity: Option<i64>,
    pub unit_cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogPatch {
    MenuItem(MenuItemPatch),
    InventoryItem(InventoryItemPatch),
    User(UserPatch),
}

impl CatalogPatch {
    pub fn kind(&self) -> CatalogKind {
        match self {
            CatalogPatch::MenuItem(_) => CatalogKind::MenuItem,
            CatalogPatch::InventoryItem(_) => CatalogKind::InventoryItem,
            CatalogPatch::User(_) => CatalogKind::User,
        }
    }

    /// Apply the patch to a record of the same kind. `None` on kind mismatch.
    pub fn apply(&self, record: &CatalogRecord) -> Option<CatalogRecord> {
        match (self, record) {
            (CatalogPatch::MenuItem(p), CatalogRecord::MenuItem(m)) => {
                Some(CatalogRecord::MenuItem(MenuItem {
                    id: m.id,
                    name: p.name.clone().unwrap_or_else(|| m.name.clone()),
                    category: p.category.clone().unwrap_or_else(|| m.category.clone()),
                    price: p.price.unwrap_or(m.price),
                }))
            }
            (CatalogPatch::InventoryItem(p), CatalogRecord::InventoryItem(i)) => {
                Some(CatalogRecord::InventoryItem(InventoryItem {
                    id: i.id,
                    sku: p.sku.clone().unwrap_or_else(|| i.sku.clone()),
                    name: p.name.clone().unwrap_or_else(|| i.name.clone()),
                    quantity: p.quantity.unwrap_or(i.quantity),
                    unit_cost: p.unit_cost.unwrap_or(i.unit_cost),
                }))
            }
            (CatalogPatch::User(p), CatalogRecord::User(u)) => Some(CatalogRecord::User(User {
                id: u.id,
                username: p.username.clone().unwrap_or_else(|| u.username.clone()),
                role: p.role.clone().unwrap_or_else(|| u.role.clone()),
            })),
            _ => None,
        }
    }
}

// ── WAL events ───────────────────────────────────────────────────

/// The event types. This is the WAL record format; records carry the full
/// post-state so replay never has to re-run validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        room: Room,
    },
    RoomDeleted {
        id: Id,
    },
    BookingConfirmed {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Id,
        room_id: Id,
        status: BookingStatus,
    },
    CatalogUpserted {
        record: CatalogRecord,
    },
    CatalogDeleted {
        kind: CatalogKind,
        id: Id,
    },
}

// ── Time helpers ─────────────────────────────────────────────────

/// Parse a client-supplied timestamp: unix milliseconds, `YYYY-MM-DD`
/// (midnight UTC) or RFC 3339.
pub fn parse_timestamp(s: &str) -> Option<Ms> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<Ms>() {
        return Some(ms);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

/// Render unix milliseconds as an RFC 3339 UTC timestamp.
pub fn format_timestamp(ms: Ms) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}
