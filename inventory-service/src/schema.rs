diesel::table! {
    products (id) {
        id -> Int4,
        name -> Varchar,
        stock -> Int4,
        version -> Int4,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        product_id -> Int4,
        quantity -> Int4,
        user_id -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(orders -> products (product_id));

diesel::allow_tables_to_appear_in_same_query!(
    orders,
    products,
);
