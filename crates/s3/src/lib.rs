//! bw-s3: S3 SDK adapter for bucketwalk
//!
//! Implements the `ListingService` trait from bw-core on top of aws-sdk-s3.

mod client;

pub use client::S3Client;
