//! Outbound federation HTTP client. Mirrors `internal/httpserver/federation.go`'s handler
//! shapes from the wire side; this module is their client-side counterpart, which
//! `original_source/` does not itself implement (the Go server only ever receives federation
//! requests, it never originates them — this relay's `send` op needs to, so this is grounded on
//! the same wire types rather than a Go client we could copy).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::multipart;

use coldwire_types::wire::{FederationInfoResponse, FederationSendMetadata};

use crate::error::RelayError;

/// GETs `federation/info` from `peer_url`, preferring HTTPS and falling back to plaintext HTTP
/// only if the HTTPS attempt fails outright (connection refused/TLS error), per spec.md's
/// "retry `http://` on failure" allowance for same-network/test deployments.
pub async fn fetch_peer_info(
    client: &reqwest::Client,
    peer_url: &str,
) -> Result<(Vec<u8>, String, Vec<u8>), RelayError> {
    let body = get_with_scheme_fallback(client, peer_url, "federation/info").await?;
    let parsed: FederationInfoResponse = body
        .json()
        .await
        .map_err(|e| RelayError::BadRequest(format!("malformed federation/info response: {e}")))?;

    let public_key = BASE64
        .decode(parsed.public_key)
        .map_err(|_| RelayError::BadRequest("peer public_key is not valid base64".into()))?;
    let signature = BASE64
        .decode(parsed.signature)
        .map_err(|_| RelayError::BadRequest("peer signature is not valid base64".into()))?;

    Ok((public_key, parsed.refetch_date, signature))
}

/// POSTs a signed blob to `peer_url/federation/send` as multipart form data, mirroring
/// `federationSendHandler`'s expected `metadata` + `blob` parts.
pub async fn send_federated_blob(
    client: &reqwest::Client,
    peer_url: &str,
    sender: &str,
    recipient: &str,
    our_url: &str,
    blob: Vec<u8>,
) -> Result<(), RelayError> {
    let metadata = FederationSendMetadata {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        url: our_url.to_string(),
    };
    let metadata_json = serde_json::to_string(&metadata)
        .map_err(|e| RelayError::BadRequest(format!("failed to encode metadata: {e}")))?;

    let build_form = || {
        multipart::Form::new()
            .text("metadata", metadata_json.clone())
            .part("blob", multipart::Part::bytes(blob.clone()))
    };

    let https_url = format!("https://{peer_url}/federation/send");
    let https_result = client
        .post(&https_url)
        .multipart(build_form())
        .send()
        .await;

    let response = match https_result {
        Ok(resp) => resp,
        Err(_) => {
            let http_url = format!("http://{peer_url}/federation/send");
            client.post(&http_url).multipart(build_form()).send().await?
        }
    };

    if !response.status().is_success() {
        return Err(RelayError::SendFailed(format!(
            "peer returned status {}",
            response.status()
        )));
    }
    Ok(())
}

async fn get_with_scheme_fallback(
    client: &reqwest::Client,
    peer_url: &str,
    path: &str,
) -> Result<reqwest::Response, RelayError> {
    let https_url = format!("https://{peer_url}/{path}");
    match client.get(&https_url).send().await {
        Ok(resp) if resp.status().is_success() => Ok(resp),
        _ => {
            let http_url = format!("http://{peer_url}/{path}");
            let resp = client.get(&http_url).send().await?;
            if !resp.status().is_success() {
                return Err(RelayError::SendFailed(format!(
                    "peer returned status {}",
                    resp.status()
                )));
            }
            Ok(resp)
        }
    }
}
