use ::std::io;
use ::std::net as yes_std;

use no_std_net as no_std;

pub(crate) fn is_would_block(err: &io::Error) -> bool {
  matches!(err.kind(),
           io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

pub(crate) fn ip_to_std(ip: no_std::IpAddr) -> yes_std::IpAddr {
  match ip {
    | no_std::IpAddr::V4(ip) => {
      let [a, b, c, d] = ip.octets();
      yes_std::IpAddr::V4(yes_std::Ipv4Addr::new(a, b, c, d))
    },
    | no_std::IpAddr::V6(ip) => {
      let [a, b, c, d, e, f, g, h] = ip.segments();
      yes_std::IpAddr::V6(yes_std::Ipv6Addr::new(a, b, c, d, e, f, g, h))
    },
  }
}

pub(crate) fn ip_from_std(ip: yes_std::IpAddr) -> no_std::IpAddr {
  match ip {
    | yes_std::IpAddr::V4(ip) => {
      let [a, b, c, d] = ip.octets();
      no_std::IpAddr::V4(no_std::Ipv4Addr::new(a, b, c, d))
    },
    | yes_std::IpAddr::V6(ip) => {
      let [a, b, c, d, e, f, g, h] = ip.segments();
      no_std::IpAddr::V6(no_std::Ipv6Addr::new(a, b, c, d, e, f, g, h))
    },
  }
}

pub(crate) fn addr_to_std(addr: no_std::SocketAddr) -> yes_std::SocketAddr {
  match addr {
    | no_std::SocketAddr::V4(v4) => yes_std::SocketAddr::new(ip_to_std(no_std::IpAddr::V4(*v4.ip())), v4.port()),
    | no_std::SocketAddr::V6(v6) => {
      let [a, b, c, d, e, f, g, h] = v6.ip().segments();
      let ip = yes_std::Ipv6Addr::new(a, b, c, d, e, f, g, h);
      yes_std::SocketAddr::V6(yes_std::SocketAddrV6::new(ip, v6.port(), v6.flowinfo(), v6.scope_id()))
    },
  }
}

pub(crate) fn addr_from_std(addr: yes_std::SocketAddr) -> no_std::SocketAddr {
  no_std::SocketAddr::new(ip_from_std(addr.ip()), addr.port())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn addrs_survive_the_trip() {
    let v4: no_std::SocketAddr = "192.0.2.1:5683".parse().unwrap();
    let v6: no_std::SocketAddr = "[2001:db8::1]:5684".parse().unwrap();

    assert_eq!(addr_to_std(v4), "192.0.2.1:5683".parse::<yes_std::SocketAddr>().unwrap());
    assert_eq!(addr_from_std(addr_to_std(v4)), v4);
    assert_eq!(addr_from_std(addr_to_std(v6)), v6);
  }
}
