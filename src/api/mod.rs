//! REST API for the parcel OCR pipeline.
//!
//! # Endpoints
//!
//! - `POST /api/process` - Run the pipeline on an uploaded image
//!   (multipart form data with a single `image` field)
//! - `GET /health` - Health check reporting OCR engine and extraction
//!   service readiness
//!
//! # cURL Examples
//!
//! ```bash
//! # Process a parcel label photo
//! curl -F "image=@parcel.jpg" http://localhost:5000/api/process
//!
//! # Health check
//! curl http://localhost:5000/health
//! ```

mod handlers;
mod server;
mod types;

pub use server::{create_router, serve};
pub use types::{ApiState, HealthResponse};
