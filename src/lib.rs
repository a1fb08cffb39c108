pub mod api;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod llm;
pub mod rag;
pub mod vector;
