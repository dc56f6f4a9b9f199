// Database rows and the SQL that touches them.

pub mod card;
pub mod card_key;
pub mod number_index;
pub mod status_request;
pub mod user;
