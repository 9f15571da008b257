pub mod io;
pub mod procedural;
pub mod rendering;
pub mod scene;
pub mod settings;
pub mod translator;
pub mod util;
