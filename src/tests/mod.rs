mod fixtures;
mod translation;
