pub const APP_NAME: &str = "ResortifyPH";

// Limits
pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const MAX_ATTACHMENT_BYTES: i64 = 10 * 1024 * 1024;
pub const MAX_FILENAME_LENGTH: usize = 255;
pub const MAX_EMOJI_LENGTH: usize = 32;

pub const MESSAGE_PAGE_SIZE: i64 = 200;

// Messages
pub const DELETED_PLACEHOLDER: &str = "Message deleted";
pub const PAYMENT_GUIDANCE: &str = "📌 Payment reminder: please coordinate payment for this stay here in the chat. \
Share the payment details and upload your receipt in this conversation so the resort can verify it. \
Never send payment outside of ResortifyPH channels.";

// Typing / presence
pub const TYPING_IDLE_MS: u64 = 3_000;
pub const TYPING_DEBOUNCE_MS: u64 = 1_000;
pub const TYPING_TTL_MS: u64 = 5_000;

// WebSocket
pub const WS_SUBSCRIBE_TIMEOUT_MS: u64 = 5_000;
pub const WS_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
