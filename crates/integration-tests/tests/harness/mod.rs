#![allow(dead_code)]

pub mod mock_proxy;
pub mod mock_spark;
