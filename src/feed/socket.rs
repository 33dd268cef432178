//! Socket tuning for the feed connection
//!
//! Applied once on the raw fd after the WebSocket connect. Failures are
//! logged and the connection continues.

use std::os::unix::io::{AsRawFd, RawFd};

use tokio::net::TcpStream;
use tokio_tungstenite::MaybeTlsStream;
use tracing::{debug, warn};

/// IPTOS_LOWDELAY from <netinet/ip.h>
const IPTOS_LOWDELAY: libc::c_int = 0x10;

/// Traffic priority for the feed socket
const SOCKET_PRIORITY: libc::c_int = 6;

/// Disable Nagle, raise traffic priority and request low-delay ToS
pub fn tune(stream: &MaybeTlsStream<TcpStream>) {
    let Some(fd) = raw_fd(stream) else {
        warn!("no raw fd available for socket tuning");
        return;
    };
    set_opt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, 1, "TCP_NODELAY");
    set_opt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_PRIORITY,
        SOCKET_PRIORITY,
        "SO_PRIORITY",
    );
    set_opt(fd, libc::IPPROTO_IP, libc::IP_TOS, IPTOS_LOWDELAY, "IP_TOS");
}

fn raw_fd(stream: &MaybeTlsStream<TcpStream>) -> Option<RawFd> {
    match stream {
        MaybeTlsStream::Plain(tcp) => Some(tcp.as_raw_fd()),
        MaybeTlsStream::Rustls(tls) => Some(tls.get_ref().0.as_raw_fd()),
        _ => None,
    }
}

fn set_opt(fd: RawFd, level: libc::c_int, name: libc::c_int, value: libc::c_int, label: &str) {
    // SAFETY: setsockopt on a live fd with a c_int-sized value
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        warn!(
            option = label,
            error = %std::io::Error::last_os_error(),
            "setsockopt failed"
        );
    } else {
        debug!(option = label, value, "socket option applied");
    }
}
