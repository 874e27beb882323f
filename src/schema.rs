diesel::table! {
    counter (id) {
        id -> Int4,
        count -> Int8,
    }
}
