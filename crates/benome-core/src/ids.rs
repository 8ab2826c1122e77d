use rand::Rng;

fn random_alnum(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

pub fn boost_id() -> String {
    format!("bst_{}", random_alnum(21))
}

pub fn payment_id() -> String {
    format!("pay_{}", random_alnum(21))
}

pub fn package_id() -> String {
    format!("pkg_{}", random_alnum(12))
}
