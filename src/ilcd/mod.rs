pub mod epd;
