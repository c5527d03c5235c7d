mod filestore;
mod operations;
