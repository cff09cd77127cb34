//! 연결별 수신 버퍼
//!
//! TCP 스트림은 패킷 경계를 보존하지 않으므로, 연결마다 수신 버퍼를
//! 두고 읽은 바이트를 누적한 뒤 디코드 루프를 돌려야 합니다.
//! [`FrameBuffer`]가 이 규약을 캡슐화합니다.
//!
//! ```text
//! loop {
//!     n = stream.read(...)
//!     buffer.extend(&bytes[..n]);
//!     while let Some(packet) = buffer.next_packet()? { ... }
//! }
//! ```

use super::{Packet, ProtocolError};

/// 연결별 수신 버퍼
///
/// `extend`로 수신 바이트를 누적하고 `next_packet`으로 완전한 패킷을
/// 하나씩 꺼냅니다. 소비한 바이트만 버퍼에서 제거되며, 불완전한
/// 패킷의 잔여 바이트는 다음 읽기까지 유지됩니다.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 수신한 바이트를 버퍼 끝에 추가합니다.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 버퍼 선두에서 완전한 패킷 하나를 디코드합니다.
    ///
    /// - `Ok(Some(packet))`: 패킷 하나를 꺼내고 해당 바이트를 제거
    /// - `Ok(None)`: 아직 완전한 패킷이 없음 (바이트 유지)
    /// - `Err(_)`: 치명적 프레임 오류. 호출자는 [`clear`](Self::clear)로
    ///   버퍼를 폐기하고 연결을 계속하거나 끊어야 합니다.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        match Packet::decode(&self.buf) {
            Ok((packet, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(packet))
            }
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// 버퍼를 폐기합니다. 프로토콜 오류 복구용.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// 현재 누적된 바이트 수
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesced_packets() {
        // 패킷 여러 개가 한 번에 도착해도 순서대로 전부 꺼내져야 한다.
        let packets = vec![
            Packet::Login {
                username: "user".into(),
                password: "pass".into(),
            },
            Packet::RoomRequest { room_type: 1 },
            Packet::Action { action: 4 },
        ];
        let mut wire = Vec::new();
        for p in &packets {
            wire.extend_from_slice(&p.serialize());
        }

        let mut buffer = FrameBuffer::new();
        buffer.extend(&wire);

        for expected in &packets {
            let got = buffer.next_packet().unwrap().expect("패킷 누락");
            assert_eq!(&got, expected);
        }
        assert!(buffer.next_packet().unwrap().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_by_byte_fragmentation() {
        // 바이트를 하나씩 흘려도 한꺼번에 준 것과 같은 결과가 나와야 한다.
        let packets = vec![
            Packet::SignIn {
                username: "a".into(),
                password: "b".into(),
            },
            Packet::Delta {
                tick: 9,
                points: [1, 0],
                deltas: vec![crate::protocol::Delta::new(1, 2, 3)],
            },
            Packet::GameStart { success: 0 },
        ];
        let mut wire = Vec::new();
        for p in &packets {
            wire.extend_from_slice(&p.serialize());
        }

        let mut buffer = FrameBuffer::new();
        let mut decoded = Vec::new();
        for byte in wire {
            buffer.extend(&[byte]);
            while let Some(packet) = buffer.next_packet().unwrap() {
                decoded.push(packet);
            }
        }
        assert_eq!(decoded, packets);
    }

    #[test]
    fn test_fatal_error_then_clear() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&[9, 9, 9]);
        assert!(buffer.next_packet().is_err());
        buffer.clear();
        buffer.extend(&Packet::ShopRequest.serialize());
        assert_eq!(buffer.next_packet().unwrap(), Some(Packet::ShopRequest));
    }
}
