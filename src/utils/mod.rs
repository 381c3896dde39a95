pub mod muloop;
pub mod stream;
