pub mod economy;
pub mod init;
