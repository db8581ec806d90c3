pub mod doctor;
pub mod generate;
pub mod init;
pub mod regenerate;
pub mod search;
pub mod serve;
