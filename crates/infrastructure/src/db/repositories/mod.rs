pub mod message_repository_impl;
pub mod room_member_repository_impl;
pub mod unread_marker_repository_impl;

pub use message_repository_impl::PgMessageRepository;
pub use room_member_repository_impl::PgRoomMemberRepository;
pub use unread_marker_repository_impl::PgUnreadMarkerRepository;
