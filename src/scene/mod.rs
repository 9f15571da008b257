pub mod expression;
pub mod path;
pub mod provider;
pub mod value;
pub mod virtual_path;
