//! SlideHub - whole-slide microscopy image server
//!
//! Slides are organised in group-owned folders, served as Deep Zoom
//! pyramids, annotated in the viewer and bundled into lectures.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod slide;
