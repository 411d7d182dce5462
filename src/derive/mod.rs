//! Derived indicators: conversion factors, growth per hectare, carbon and genus composition.

pub mod bcef;
pub mod carbon;
pub mod genus;
pub mod increments;
pub mod interp;
pub mod root_ratio;

pub use bcef::TypeRecord;
pub use carbon::{carbon_increments, convert_gain_tc, convert_loss_tc, CarbonGrowth};
pub use increments::Growth;
