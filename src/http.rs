pub use popin_core::net::{HttpClient, HttpRequest, HttpResponse};
