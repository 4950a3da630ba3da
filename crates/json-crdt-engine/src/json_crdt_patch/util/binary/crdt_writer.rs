use crdt_pack::Writer;

/// CRDT varint framing on top of [`Writer`].
pub trait CrdtWriter {
    fn vu57(&mut self, num: u64);
    fn b1vu56(&mut self, flag: u8, num: u64);
    fn id(&mut self, x: u64, y: u64);
}

impl CrdtWriter for Writer {
    fn vu57(&mut self, mut num: u64) {
        for _ in 0..7 {
            if num <= 0x7f {
                self.u8(num as u8);
                return;
            }
            self.u8(0x80 | (num & 0x7f) as u8);
            num >>= 7;
        }
        self.u8(num as u8);
    }

    fn b1vu56(&mut self, flag: u8, num: u64) {
        let head = (flag & 1) << 7;
        if num <= 0x3f {
            self.u8(head | num as u8);
            return;
        }
        self.u8(head | 0x40 | (num & 0x3f) as u8);
        let mut rest = num >> 6;
        for _ in 0..6 {
            if rest <= 0x7f {
                self.u8(rest as u8);
                return;
            }
            self.u8(0x80 | (rest & 0x7f) as u8);
            rest >>= 7;
        }
        self.u8(rest as u8);
    }

    fn id(&mut self, x: u64, y: u64) {
        if x <= 0b111 && y <= 0b1111 {
            self.u8((x as u8) << 4 | y as u8);
        } else {
            self.b1vu56(1, x);
            self.vu57(y);
        }
    }
}
