pub mod cache;
pub mod generate;
pub mod io;
pub mod pool;
pub mod scene;
pub mod spawn;
pub mod util;
