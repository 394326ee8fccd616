mod generate;
mod list;
mod serve;

pub use generate::Generate;
pub use list::List;
pub use serve::Serve;
