use crate::util::{dispatcher, exit_dispatch_error, print_json};

pub async fn run(api_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let body = dispatcher(api_url)
        .health()
        .await
        .unwrap_or_else(|e| exit_dispatch_error(&e));
    print_json(&body)
}
