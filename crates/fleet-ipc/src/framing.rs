use futures_util::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use fleet_core::proto::{Envelope, Request, Response};

pub type FramedStream = Framed<tokio::net::UnixStream, LengthDelimitedCodec>;

pub fn framed(stream: tokio::net::UnixStream) -> FramedStream {
    Framed::new(stream, LengthDelimitedCodec::new())
}

pub async fn send_request(framed: &mut FramedStream, req: &Envelope<Request>) -> io::Result<()> {
    send_json(framed, req).await
}

pub async fn send_response(framed: &mut FramedStream, resp: &Envelope<Response>) -> io::Result<()> {
    send_json(framed, resp).await
}

pub async fn read_response(framed: &mut FramedStream) -> io::Result<Envelope<Response>> {
    read_json(framed)
        .await?
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "socket closed"))
}

/// Returns `Ok(None)` when the peer closed the connection between requests.
pub async fn read_request(framed: &mut FramedStream) -> io::Result<Option<Envelope<Request>>> {
    read_json(framed).await
}

async fn send_json<T: Serialize>(framed: &mut FramedStream, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    framed.send(tokio_util::bytes::Bytes::from(bytes)).await
}

async fn read_json<T: DeserializeOwned>(framed: &mut FramedStream) -> io::Result<Option<T>> {
    let Some(frame) = framed.next().await else {
        return Ok(None);
    };
    let frame = frame?;
    serde_json::from_slice::<T>(&frame)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::proto::Request;

    #[tokio::test]
    async fn request_and_response_cross_the_socket_pair() {
        let (a, b) = tokio::net::UnixStream::pair().expect("socket pair");
        let mut client = framed(a);
        let mut server = framed(b);

        let req = Envelope {
            id: 7,
            payload: Request::SyncPlayers { server: "srv1".into(), wait: true },
        };
        send_request(&mut client, &req).await.expect("send request");

        let got = read_request(&mut server)
            .await
            .expect("read request")
            .expect("request present");
        assert_eq!(got.id, 7);
        assert!(matches!(
            got.payload,
            Request::SyncPlayers { ref server, wait: true } if server == "srv1"
        ));

        let resp = Envelope { id: 7, payload: Response::WhitelistUpdated {} };
        send_response(&mut server, &resp).await.expect("send response");
        let back = read_response(&mut client).await.expect("read response");
        assert_eq!(back.id, 7);
        assert!(matches!(back.payload, Response::WhitelistUpdated {}));
    }

    #[tokio::test]
    async fn closed_peer_reads_as_none() {
        let (a, b) = tokio::net::UnixStream::pair().expect("socket pair");
        drop(a);
        let mut server = framed(b);
        assert!(read_request(&mut server).await.expect("clean eof").is_none());
    }
}
