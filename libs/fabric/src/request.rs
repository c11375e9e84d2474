use std::net::SocketAddr;

use conduit_core::CallOptions;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::channel::Channel;
use crate::codec::Marshaller;
use crate::error::Result;
use crate::framing::Framer;

/// Perform a unary call over an open channel
///
/// Sends the request, ends the request stream and reads the single response.
/// `None` means the peer ended the call without a response message.
pub async fn unary<R, W, Req, Res, MReq, MRes>(
    channel: &mut Channel<R, W>,
    request: &Req,
    request_marshaller: &MReq,
    response_marshaller: &MRes,
    options: &CallOptions,
) -> Result<Option<Res>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    MReq: Marshaller<Req> + ?Sized,
    MRes: Marshaller<Res> + ?Sized,
{
    channel.send(request, request_marshaller, options).await?;
    channel.finish_sending().await?;
    channel.receive_single(response_marshaller, options).await
}

/// Perform a one-off unary call over TCP
///
/// Opens a connection, performs the call and closes the connection.
pub async fn unary_tcp<Req, Res, MReq, MRes>(
    addr: SocketAddr,
    framer: Framer,
    request: &Req,
    request_marshaller: &MReq,
    response_marshaller: &MRes,
    options: &CallOptions,
) -> Result<Option<Res>>
where
    MReq: Marshaller<Req> + ?Sized,
    MRes: Marshaller<Res> + ?Sized,
{
    let mut channel = Channel::tcp(addr, framer).await?;
    unary(
        &mut channel,
        request,
        request_marshaller,
        response_marshaller,
        options,
    )
    .await
}
