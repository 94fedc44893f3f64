//! Normalized listing and account models shared by every driver.

mod torrent;
mod user;

pub use torrent::TorrentItem;
pub use user::UserInfo;
